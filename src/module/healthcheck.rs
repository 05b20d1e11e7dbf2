//! Periodic ping of an external health-check URL
//!
//! Lets a dead-man's-switch service notice when the whole device goes dark.
//! Failures are logged and never affect recording.

use crate::constants::HEALTH_CHECK_INTERVAL;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::time::sleep;

pub struct HealthCheckJob;

#[async_trait]
impl Job for HealthCheckJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let url = match &runtime.config.health_check_url {
            Some(url) => url.clone(),
            None => {
                stop.wait().await;
                return Ok(());
            }
        };

        loop {
            match runtime.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("health check ping delivered")
                }
                Ok(response) => warn!("health check returned {}", response.status()),
                Err(e) => warn!("error delivering health check ping: {}", e),
            }

            tokio::select! {
                _ = sleep(HEALTH_CHECK_INTERVAL) => {}
                () = stop.wait() => return Ok(()),
            }
        }
    }
}
