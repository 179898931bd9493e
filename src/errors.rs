//! Error types for the resource pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Wait for a resource was cancelled")]
    Cancelled,

    #[error("No resource became available within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Pool capacity must be positive, got {0}")]
    InvalidCapacity(usize),

    #[error("Deferred task failed: {0}")]
    TaskFailed(String),

    #[error("Scheduler is shutting down - no new jobs accepted")]
    SchedulerClosed,

    #[error("Failed to start worker: {0}")]
    SpawnFailed(String),

    #[error("Resource channel is closed")]
    Closed,
}

pub type PoolResult<T> = Result<T, PoolError>;
