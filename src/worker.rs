//! Units of work that borrow a pooled handle

use crate::cancel::CancelToken;
use crate::errors::{PoolError, PoolResult};
use crate::handle::ResourceHandle;
use crate::pool::ResourcePool;

use crossbeam::channel::RecvTimeoutError;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

type Work = Box<dyn FnOnce(&ResourceHandle) -> PoolResult<()> + Send + 'static>;

/// What a finished job did with its handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub label: String,
    pub handle_id: usize,
    pub handle_name: String,
    /// Time spent waiting in acquire
    pub waited: Duration,
    /// Time the handle was held
    pub held: Duration,
}

/// One acquire, work, release cycle.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{CancelToken, Job, ResourcePool};
/// use std::time::Duration;
///
/// let pool = ResourcePool::with_capacity(1).unwrap();
/// let report = Job::new("worker-1", Duration::from_millis(5))
///     .run(&pool, &CancelToken::new())
///     .unwrap();
///
/// assert_eq!(report.handle_name, "Connection 1");
/// assert_eq!(pool.available_count(), 1);
/// ```
pub struct Job {
    label: String,
    hold: Duration,
    work: Option<Work>,
}

impl Job {
    /// A job that just holds a handle for `hold`
    pub fn new(label: impl Into<String>, hold: Duration) -> Self {
        Self {
            label: label.into(),
            hold,
            work: None,
        }
    }

    /// Run `work` against the handle before holding it
    pub fn with_work<F>(mut self, work: F) -> Self
    where
        F: FnOnce(&ResourceHandle) -> PoolResult<()> + Send + 'static,
    {
        self.work = Some(Box::new(work));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Acquire a handle, do the work, then release it.
    ///
    /// The handle is released even when the work fails, panics, or the hold
    /// is cut short by `cancel`.
    pub fn run(self, pool: &ResourcePool, cancel: &CancelToken) -> PoolResult<WorkerReport> {
        let started = Instant::now();
        let guard = pool.checkout_cancellable(cancel)?;
        let waited = started.elapsed();
        let handle_name = guard.name().to_string();
        info!(worker = %self.label, handle = %handle_name, "{} acquired {}", self.label, handle_name);

        let acquired_at = Instant::now();
        let hold = self.hold;
        let outcome = match self.work {
            Some(work) => work(&*guard),
            None => Ok(()),
        }
        .and_then(|()| match cancel.receiver().recv_timeout(hold) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            // Disconnected means cancelled; nothing is ever sent
            Err(RecvTimeoutError::Disconnected) | Ok(()) => Err(PoolError::Cancelled),
        });

        let handle_id = guard.id();
        let held = acquired_at.elapsed();
        drop(guard);
        info!(worker = %self.label, handle = %handle_name, "{} released {}", self.label, handle_name);
        outcome?;

        let report = WorkerReport {
            label: self.label,
            handle_id,
            handle_name,
            waited,
            held,
        };

        Ok(report)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .field("hold", &self.hold)
            .field("has_work", &self.work.is_some())
            .finish()
    }
}
