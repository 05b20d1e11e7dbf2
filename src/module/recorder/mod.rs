//! Recording supervisor
//!
//! Keeps every configured camera producing fixed-duration segments
//! indefinitely, under cancellation and partial failure. Cameras travel
//! through a single-slot handoff queue between the dispatcher and short-lived
//! workers; each worker runs one segment session and re-enqueues its camera
//! exactly once, either early (parallel transition) or on completion.

mod dispatcher;
mod prober;
mod session;

pub use dispatcher::{Dispatcher, SegmentRunner};
pub use prober::Prober;
pub use session::FfmpegSegmentRunner;

use crate::constants::{MOUNT_RETRY_INTERVAL, PAUSE_KEY};
use crate::domain::config;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::time::sleep;

/// Job driving the per-camera recording loops
pub struct RecorderJob;

#[async_trait]
impl Job for RecorderJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        // a pause request stored by the operator delays recording once
        if let Some(raw) = runtime.kv.get(PAUSE_KEY).await {
            runtime.kv.del(PAUSE_KEY).await;
            runtime.kv.flush().await;

            match humantime::parse_duration(&raw) {
                Ok(pause) => {
                    info!("recording paused for {}", raw);
                    tokio::select! {
                        _ = sleep(pause) => {}
                        () = stop.wait() => return Ok(()),
                    }
                }
                Err(_) => warn!("ignoring unparsable pause '{}'", raw),
            }
        }

        if !runtime.storage.is_mounted().await {
            runtime.indicator.bad_hd();
            runtime.storage.try_mount().await;

            while !runtime.storage.is_mounted().await {
                warn!("storage is not mounted. waiting..");
                tokio::select! {
                    _ = sleep(MOUNT_RETRY_INTERVAL) => {}
                    () = stop.wait() => return Ok(()),
                }
            }
        }
        info!("storage is mounted");

        // a configuration dropped into the recording area is promoted now;
        // the process restarts (or the host reboots) to pick it up
        if let Some(outcome) = config::apply_pending_update(
            &runtime.config,
            &runtime.settings.config_path,
            &runtime.settings.videos_dir,
        )
        .await
        {
            runtime.indicator.confirm();
            let mut stone = runtime.heart_stone.clone();

            match outcome {
                config::UpdateOutcome::Reboot => {
                    stone.request_reboot("configuration update with wifi credentials").await
                }
                config::UpdateOutcome::Restart => {
                    stone.request_restart("configuration update").await
                }
            }

            return Ok(());
        }

        runtime.indicator.on();

        let runner = Arc::new(FfmpegSegmentRunner::new(runtime.clone()));
        let dispatcher = Dispatcher::new(runner, runtime.settings.duration);
        dispatcher.run(&runtime.cameras, stop).await;

        Ok(())
    }
}
