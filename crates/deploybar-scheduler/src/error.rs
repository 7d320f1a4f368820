use thiserror::Error;

/// Errors returned when registering tasks with the scheduler.
///
/// Failures of the task actions themselves never surface here; they are
/// recorded in the failure ledger and the loop keeps running.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task was registered with a zero interval.
    #[error("Invalid interval for task {name}: interval must be positive")]
    InvalidInterval { name: String },

    /// `repeat` or `resume` was called outside a Tokio runtime.
    #[error("No Tokio runtime available to drive scheduled tasks")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
