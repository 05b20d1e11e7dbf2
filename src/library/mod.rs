//! Application-agnostic building blocks shared by all subsystems

pub mod helpers;
pub mod indicator;
pub mod kvstore;
pub mod scheduling;

/// Type-erased error used at module boundaries
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result with no value and a type-erased error
pub type EmptyResult = Result<(), BoxedError>;
