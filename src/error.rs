//! Error types shared across the controller.

use thiserror::Error;

/// Errors raised by the controller, its math helpers and the scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    /// A caller-supplied value was out of range or inconsistent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A jittered wait was cut short by cancellation
    #[error("Wait was interrupted")]
    InterruptedWait,
    /// Normalisation was requested over an empty range
    #[error("Cannot normalise over a degenerate range (min = max = {0})")]
    DivisionDegenerate(f64),
    /// Work was submitted to a stopped scheduler or controller
    #[error("Task scheduler is not running")]
    SchedulerStopped,
    /// A scheduler worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl CameraError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CameraError::InvalidArgument(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CameraError>;
