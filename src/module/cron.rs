//! Periodic task firing
//!
//! Each cron entry gets its own ticker; on every tick the named tasks are
//! looked up in the registry and fired in declaration order. Unknown names
//! and zero intervals are logged and skipped.

use crate::domain::config::CronEntry;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::sleep;

pub struct CronJob;

#[async_trait]
impl Job for CronJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let entries = runtime.config.cron.clone();

        if entries.is_empty() {
            stop.wait().await;
            return Ok(());
        }

        info!("setting up {} cron entries", entries.len());

        let mut tickers = Vec::new();
        for entry in entries {
            if entry.every.is_zero() {
                warn!("cron entry with zero interval skipped");
                continue;
            }
            tickers.push(tokio::spawn(tick(runtime.clone(), entry, stop.clone())));
        }

        stop.wait().await;

        for ticker in tickers {
            ticker.await.ok();
        }

        Ok(())
    }
}

async fn tick(runtime: Runtime, entry: CronEntry, stop: StopSignal) {
    loop {
        tokio::select! {
            _ = sleep(entry.every) => {}
            () = stop.wait() => return,
        }

        debug!("running cron tasks {:?}", entry.tasks);
        runtime.run_tasks(&entry.tasks, "cron");
    }
}
