//! Process lifecycle: keeping the supervisor alive until something asks it to
//! stop, and winding everything down within a bounded drain

mod heart;
mod module;

pub use heart::{DeathReason, Heart, HeartStone};
pub use module::{Module, ModuleOutcome, ModuleRunner, ModuleTerminationReason};
