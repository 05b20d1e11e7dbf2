//! Supervisor module
//!
//! Owns the boot order: background subsystems first, then the recording
//! supervisor, then hand-off of the process lifecycle to the heart. On
//! shutdown the scheduler drains all jobs and the key/value store is closed.

use crate::domain::notification::Notification;
use crate::harness::{Heart, Module, ModuleTerminationReason};
use crate::library::scheduling::JobScheduler;
use crate::library::BoxedError;
use crate::module::admin::AdminJob;
use crate::module::context::Runtime;
use crate::module::cron::CronJob;
use crate::module::healthcheck::HealthCheckJob;
use crate::module::motion::MotionJob;
use crate::module::notifier::NotifierJob;
use crate::module::recorder::RecorderJob;
use crate::module::retention::RetentionJob;
use crate::schedule;
use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

/// Module implementation wiring all subsystems together
pub struct Supervisor {
    runtime: Runtime,
    heart: Option<Heart>,
    notifications: Option<mpsc::Receiver<Notification>>,
}

impl Supervisor {
    pub fn new(
        runtime: Runtime,
        heart: Heart,
        notifications: mpsc::Receiver<Notification>,
    ) -> Self {
        Self {
            runtime,
            heart: Some(heart),
            notifications: Some(notifications),
        }
    }
}

#[async_trait]
impl Module for Supervisor {
    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let runtime = self.runtime.clone();

        let admin_job = AdminJob;
        let cron_job = CronJob;
        let retention_job = RetentionJob;
        let recorder_job = RecorderJob;

        schedule!(scheduler, runtime, {
            admin_job,
            cron_job,
            retention_job,
        });

        if let Some(notifications) = self.notifications.take() {
            scheduler.spawn_job(NotifierJob::new(notifications), runtime.clone());
        }

        if runtime
            .cameras
            .iter()
            .any(|camera| camera.motion_detection.is_some())
        {
            scheduler.spawn_job(MotionJob, runtime.clone());
        }

        if runtime.config.health_check_url.is_some() {
            scheduler.spawn_job(HealthCheckJob, runtime.clone());
        }

        scheduler.spawn_job(recorder_job, runtime.clone());

        info!("started!");
        runtime.notifier.notify(format!(
            "VigilantPI {} started at {}",
            runtime.settings.version,
            runtime.settings.started.format("%H:%M:%S - %d/%m/%Y")
        ));

        Ok(self.heart.take())
    }

    async fn post_shutdown(&mut self, termination_reason: &ModuleTerminationReason) {
        self.runtime.kv.close().await;

        match termination_reason {
            ModuleTerminationReason::HeartDied(reason) => info!("shutting down: {}", reason),
            _ => info!("shutting down"),
        }
    }
}
