//! Supervision of long-lived subsystems
//!
//! A [`Job`] is one of the supervisor's subsystems (the admin server, the
//! cron ticker, the recording supervisor itself). The [`JobScheduler`] keeps
//! them running, restarts crashed ones a few times, and winds all of them
//! down together within a bounded grace on shutdown. Cancellation travels as
//! a [`StopSignal`], the crate-wide cooperative stop flag that encoder
//! sessions and sub-tasks share as well.

mod job;
mod job_scheduler;
mod stop;

pub use job::Job;
pub use job_scheduler::JobScheduler;
pub use stop::StopSignal;
