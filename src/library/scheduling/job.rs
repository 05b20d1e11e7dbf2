use anyhow::Result;
use async_trait::async_trait;

use super::stop::StopSignal;

/// One long-lived subsystem of the supervisor
///
/// There is no notion of a job that cannot be asked to stop: the process has
/// to drain within a bounded window on shutdown, so every subsystem watches
/// the shared [`StopSignal`] at all of its long waits and returns once it
/// fires. A job that returns an error is restarted a few times before the
/// scheduler gives up on it.
#[async_trait]
pub trait Job {
    type Context;

    /// Name of the job displayed in log messages
    const NAME: &'static str;

    async fn run(&self, context: Self::Context, stop: StopSignal) -> Result<()>;
}
