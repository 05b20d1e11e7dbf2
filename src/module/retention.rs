//! Retention sweeping of the recording area
//!
//! Day directories older than the configured horizon are deleted; entries
//! whose names do not parse as a day directory are invisible to the sweep.
//! Deletions run concurrently and failures are logged, not retried until the
//! next sweep.

use crate::constants::RETENTION_INTERVAL;
use crate::domain::layout;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use log::{error, info};
use std::path::Path;
use tokio::time::sleep;

pub struct RetentionJob;

#[async_trait]
impl Job for RetentionJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let videos_dir = runtime.settings.videos_dir.clone();
        let keep_days = runtime.settings.delete_after_days;

        loop {
            let cutoff = Local::now().date_naive() - ChronoDuration::days(keep_days);
            sweep(&videos_dir, cutoff).await;

            tokio::select! {
                _ = sleep(RETENTION_INTERVAL) => {}
                () = stop.wait() => return Ok(()),
            }
        }
    }
}

/// Deletes every day directory strictly older than the cutoff date
pub async fn sweep(videos_dir: &Path, cutoff: NaiveDate) {
    info!("verifying old content, deleting days before {}", cutoff);

    let mut entries = match tokio::fs::read_dir(videos_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            error!(
                "error listing {} while deleting old content: {}",
                videos_dir.display(),
                e
            );
            return;
        }
    };

    let mut deletions = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let date = match name.to_str().and_then(layout::parse_day_dir) {
            Some(date) => date,
            None => continue,
        };

        if date >= cutoff {
            continue;
        }

        let path = entry.path();
        deletions.push(tokio::spawn(async move {
            info!("deleting {}", path.display());
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                error!("error deleting {}: {}", path.display(), e);
            }
        }));
    }

    for deletion in deletions {
        deletion.await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DAY_DIR_FORMAT;

    fn day_dir(date: NaiveDate) -> String {
        date.format(DAY_DIR_FORMAT).to_string()
    }

    #[tokio::test]
    async fn deletes_only_directories_beyond_the_horizon() {
        let root = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();

        let keep_today = root.path().join(day_dir(today));
        let keep_recent = root.path().join(day_dir(today - ChronoDuration::days(5)));
        let drop_old = root.path().join(day_dir(today - ChronoDuration::days(40)));
        let keep_unrelated = root.path().join("snapshots");
        let keep_malformed = root.path().join("rec_2020_01_01.bak");

        for dir in [
            &keep_today,
            &keep_recent,
            &drop_old,
            &keep_unrelated,
            &keep_malformed,
        ] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(drop_old.join("09_00_00_porch.mp4"), b"segment").unwrap();

        sweep(root.path(), today - ChronoDuration::days(20)).await;

        assert!(keep_today.exists());
        assert!(keep_recent.exists());
        assert!(keep_unrelated.exists());
        assert!(keep_malformed.exists());
        assert!(!drop_old.exists());
    }

    #[tokio::test]
    async fn the_cutoff_day_itself_survives() {
        let root = tempfile::tempdir().unwrap();
        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let on_cutoff = root.path().join(day_dir(cutoff));
        let before_cutoff = root.path().join(day_dir(cutoff - ChronoDuration::days(1)));
        std::fs::create_dir_all(&on_cutoff).unwrap();
        std::fs::create_dir_all(&before_cutoff).unwrap();

        sweep(root.path(), cutoff).await;

        assert!(on_cutoff.exists());
        assert!(!before_cutoff.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_not_fatal() {
        sweep(Path::new("/definitely/not/here"), NaiveDate::MIN).await;
    }
}
