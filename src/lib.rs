//! This library crate contains all the necessities to run a VigilantPI instance.
//!
//! Submodules have been introduced to split responsibilities. Each module has a specific
//! focus and together they form a chain of dependencies from the low-level [`library`],
//! over the VigilantPI [`domain`] specific logic, through the executable [`harness`],
//! up to the long-running subsystems in [`module`].

pub mod constants;
pub mod domain;
pub mod harness;
pub mod library;
pub mod module;
