use log::{debug, error, warn};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use super::job::Job;
use super::stop::StopSignal;

// A subsystem that keeps dying is usually missing host state (an unbound
// port, unreadable storage). Retrying forever would burn the little CPU a
// recording device has, so after a few spaced-out attempts the job is
// abandoned and the device limps on without it; the recordings themselves
// recover through the camera health loop, not through job restarts.
const RETRY_LIMIT: u32 = 8;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

struct RunningJob {
    name: &'static str,
    stop: watch::Sender<Option<()>>,
    handle: JoinHandle<()>,
}

/// Keeps the supervisor's subsystems running and winds them down together
#[derive(Default)]
pub struct JobScheduler {
    jobs: Mutex<Vec<RunningJob>>,
}

impl JobScheduler {
    /// Starts a job with its own stop flag, restarting it on failure
    pub fn spawn_job<J>(&self, job: J, context: J::Context)
    where
        J: Job + Send + Sync + 'static,
        J::Context: Clone + Send + Sync + 'static,
    {
        let (stop_tx, stop) = StopSignal::pair();
        let handle = tokio::spawn(run_with_retries(job, context, stop));

        self.jobs.lock().unwrap().push(RunningJob {
            name: J::NAME,
            stop: stop_tx,
            handle,
        });
    }

    /// Trips every job's stop flag and joins them, sharing one grace budget.
    ///
    /// Jobs still running when the budget is spent are aborted. Returns
    /// whether everything wound down in time; the lifecycle controller turns
    /// a `false` into exit code 2 so an external supervisor reboots the host.
    pub async fn terminate_jobs(&self, grace: Duration) -> bool {
        let jobs: Vec<RunningJob> = self.jobs.lock().unwrap().drain(..).collect();

        for job in &jobs {
            job.stop.send(Some(())).ok();
        }

        let deadline = Instant::now() + grace;
        let mut drained = true;

        for mut job in jobs {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match timeout(remaining, &mut job.handle).await {
                Ok(_) => debug!("{} stopped", job.name),
                Err(_) => {
                    warn!("{} ignored the stop request", job.name);
                    job.handle.abort();
                    drained = false;
                }
            }
        }

        drained
    }
}

async fn run_with_retries<J>(job: J, context: J::Context, stop: StopSignal)
where
    J: Job + Send + Sync + 'static,
    J::Context: Clone + Send + Sync + 'static,
{
    let mut delay = INITIAL_RETRY_DELAY;

    for attempt in 1..=RETRY_LIMIT {
        match job.run(context.clone(), stop.clone()).await {
            Ok(()) => {
                debug!("{} finished", J::NAME);
                return;
            }
            Err(e) => error!("{} failed: {:#}", J::NAME, e),
        }

        if stop.triggered() {
            return;
        }

        if attempt == RETRY_LIMIT {
            error!("{} keeps failing, giving up on it", J::NAME);
            return;
        }

        debug!("{} restarting in {:?}", J::NAME, delay);
        tokio::select! {
            _ = sleep(delay) => {}
            () = stop.wait() => return,
        }

        delay = (delay * 2).min(MAX_RETRY_DELAY);
    }
}

/// Schedule jobs on a given scheduler with some context
#[macro_export]
macro_rules! schedule {
    ($scheduler:expr, $context:expr, { $($job:ident$(,)? )+ }) => {
        $(
            $scheduler.spawn_job($job, $context.clone());
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct WellBehaved {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Job for WellBehaved {
        type Context = ();

        const NAME: &'static str = "well-behaved";

        async fn run(&self, _context: (), stop: StopSignal) -> Result<()> {
            stop.wait().await;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn winds_down_jobs_within_the_grace() {
        let scheduler = JobScheduler::default();
        let stopped = Arc::new(AtomicBool::new(false));

        scheduler.spawn_job(
            WellBehaved {
                stopped: stopped.clone(),
            },
            (),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(scheduler.terminate_jobs(Duration::from_secs(1)).await);
        assert!(stopped.load(Ordering::SeqCst));
    }

    struct Stubborn;

    #[async_trait]
    impl Job for Stubborn {
        type Context = ();

        const NAME: &'static str = "stubborn";

        async fn run(&self, _context: (), _stop: StopSignal) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_jobs_that_ignore_the_stop() {
        let scheduler = JobScheduler::default();
        scheduler.spawn_job(Stubborn, ());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!scheduler.terminate_jobs(Duration::from_millis(100)).await);
    }

    struct FlakyOnce {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for FlakyOnce {
        type Context = ();

        const NAME: &'static str = "flaky-once";

        async fn run(&self, _context: (), stop: StopSignal) -> Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("first run dies");
            }
            stop.wait().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_jobs_are_restarted_after_a_delay() {
        let scheduler = JobScheduler::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        scheduler.spawn_job(
            FlakyOnce {
                attempts: attempts.clone(),
            },
            (),
        );

        // well past the first retry delay, well short of a second attempt's
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        assert!(scheduler.terminate_jobs(Duration::from_secs(1)).await);
    }
}
