//! Shared context handed to every job
//!
//! All cross-cutting state is collected into one immutable [`Runtime`] value
//! assembled by the lifecycle controller instead of process-wide mutables.
//! The camera list and task registry are built once at boot and read-only
//! afterwards; mutable runtime state (camera health, the key/value store, the
//! notification queue) sits behind its own synchronization.

use crate::constants::{
    DEFAULT_ADMIN_ADDR, DEFAULT_DELETE_AFTER_DAYS, DEFAULT_DURATION, DEFAULT_FFMPEG,
    DEFAULT_TERMINATION_TIMEOUT, DEFAULT_VIDEOS_DIR, TASK_TIMEOUT,
};
use crate::domain::camera::Camera;
use crate::domain::config::{Config, TokenExpander};
use crate::domain::mount::StorageMount;
use crate::domain::notification::Notifier;
use crate::domain::task::{self, Task};
use crate::harness::HeartStone;
use crate::library::indicator::Indicator;
use crate::library::kvstore::KeyValueStore;
use chrono::{DateTime, Local};
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Boot-time values resolved from the configuration, with defaults applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub version: &'static str,
    pub started: DateTime<Local>,
    pub config_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub videos_dir: PathBuf,
    pub ffmpeg: PathBuf,
    pub duration: Duration,
    pub termination_timeout: Duration,
    pub delete_after_days: i64,
    pub admin_addr: String,
    pub debug: bool,
}

impl Settings {
    pub fn resolve(config: &Config, config_path: PathBuf, log_file: Option<PathBuf>) -> Self {
        let videos_dir = if config.videos_dir.is_empty() {
            info!("no videos_dir defined, using default value");
            DEFAULT_VIDEOS_DIR.into()
        } else {
            PathBuf::from(&config.videos_dir)
        };

        let ffmpeg = if config.ffmpeg.is_empty() {
            info!("ffmpeg path undefined, using default value");
            DEFAULT_FFMPEG.into()
        } else {
            PathBuf::from(&config.ffmpeg)
        };

        let duration = config.duration.unwrap_or_else(|| {
            info!("no duration defined, using default value");
            DEFAULT_DURATION
        });

        let delete_after_days = match config.delete_after_days {
            Some(days) if days > 0 => days,
            _ => DEFAULT_DELETE_AFTER_DAYS,
        };

        let admin_addr = if config.admin.addr.is_empty() {
            DEFAULT_ADMIN_ADDR.to_owned()
        } else {
            config.admin.addr.clone()
        };

        Self {
            version: env!("CARGO_PKG_VERSION"),
            started: Local::now(),
            config_path,
            log_file,
            videos_dir,
            ffmpeg,
            duration,
            termination_timeout: config
                .termination_timeout
                .unwrap_or(DEFAULT_TERMINATION_TIMEOUT),
            delete_after_days,
            admin_addr,
            debug: config.debug,
        }
    }
}

/// Immutable context shared by all jobs
#[derive(Clone)]
pub struct Runtime {
    pub settings: Arc<Settings>,
    pub config: Arc<Config>,
    pub cameras: Arc<Vec<Arc<Camera>>>,
    pub tasks: Arc<HashMap<String, Task>>,
    pub expander: Arc<TokenExpander>,
    pub storage: Arc<StorageMount>,
    pub indicator: Indicator,
    pub notifier: Notifier,
    pub kv: Arc<dyn KeyValueStore>,
    pub heart_stone: HeartStone,
    pub http: reqwest::Client,
}

impl Runtime {
    pub fn assemble(
        config: Config,
        settings: Settings,
        indicator: Indicator,
        notifier: Notifier,
        kv: Arc<dyn KeyValueStore>,
        heart_stone: HeartStone,
    ) -> Self {
        let cameras = Arc::new(
            config
                .cameras
                .iter()
                .cloned()
                .map(Arc::new)
                .collect::<Vec<_>>(),
        );

        let tasks = Arc::new(task::build_registry(&config.tasks));
        let expander = Arc::new(TokenExpander::from_config(&config));
        let storage = Arc::new(StorageMount::new(
            &config.mount_dir,
            &config.mount_dev,
            &config.mount_label,
            config.prevent_hdd_spindown,
        ));

        let http = reqwest::Client::builder()
            .timeout(TASK_TIMEOUT)
            .build()
            .expect("default HTTP client configuration is valid");

        Self {
            settings: Arc::new(settings),
            config: Arc::new(config),
            cameras,
            tasks,
            expander,
            storage,
            indicator,
            notifier,
            kv,
            heart_stone,
            http,
        }
    }

    /// Fires the named tasks in declaration order, logging unknown names
    pub fn run_tasks(&self, names: &[String], kind: &str) {
        for name in names {
            match self.tasks.get(name) {
                Some(task) => task.run(&self.http, &self.expander),
                None => warn!("invalid {} task {}", kind, name),
            }
        }
    }
}
