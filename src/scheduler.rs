//! Scheduling strategies that drive jobs against a shared pool
//!
//! Both strategies feed the same [`Job`] into the same [`ResourcePool`]; the
//! pool cannot tell them apart.
//!
//! - [`ThreadScheduler`] runs each job on one of a fixed set of worker
//!   threads. Failures are logged there and go no further.
//! - [`TaskScheduler`] runs each job as a deferred task on a tokio runtime and
//!   hands back a [`TaskHandle`] that resolves to the job's result.

use crate::cancel::CancelToken;
use crate::errors::{PoolError, PoolResult};
use crate::pool::ResourcePool;
use crate::worker::{Job, WorkerReport};

use crossbeam::channel::{self, Sender, select};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest the tokio runtime is given to wind down once jobs have finished or
/// been cancelled
const RUNTIME_DRAIN_LIMIT: Duration = Duration::from_secs(30);

/// A way of running jobs against a pool
pub trait Scheduler {
    /// What the submitter gets back for each job
    type Completion;

    fn submit(&self, job: Job) -> PoolResult<Self::Completion>;

    /// Submit every job in order, stopping at the first refusal
    fn submit_all<I>(&self, jobs: I) -> PoolResult<Vec<Self::Completion>>
    where
        I: IntoIterator<Item = Job>,
    {
        jobs.into_iter().map(|job| self.submit(job)).collect()
    }

    /// Stop accepting jobs and wait up to `grace` for running ones. Past the
    /// deadline, outstanding waits and holds are cancelled.
    fn shutdown(self, grace: Duration) -> ShutdownReport;
}

/// Outcome of a scheduler shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    pub completed: usize,
    pub failed: usize,
    /// The grace period ran out and outstanding jobs were cancelled
    pub forced: bool,
}

#[derive(Debug, Default)]
struct JobCounters {
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl JobCounters {
    fn started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, result: &PoolResult<WorkerReport>) {
        match result {
            Ok(_) => self.completed.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Jobs still in flight once the workers are gone never ran; they count
    /// as failed
    fn report(&self, forced: bool) -> ShutdownReport {
        let dropped = self.in_flight.swap(0, Ordering::SeqCst);
        if dropped > 0 {
            warn!(dropped, "jobs were dropped before they could run");
        }

        ShutdownReport {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst) + dropped,
            forced,
        }
    }
}

/// Poll `done` until it holds or `grace` runs out. Returns false on timeout.
/// A grace too large to represent as a deadline waits without limit.
fn wait_until(grace: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(grace);
    while !done() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
        thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }
    true
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Run a job, turning a panic into [`PoolError::TaskFailed`]
fn run_guarded(job: Job, pool: &ResourcePool, cancel: &CancelToken) -> PoolResult<WorkerReport> {
    panic::catch_unwind(AssertUnwindSafe(|| job.run(pool, cancel)))
        .unwrap_or_else(|payload| Err(PoolError::TaskFailed(panic_message(payload.as_ref()))))
}

/// Blocking mode: a fixed set of threads, each blocking in acquire and
/// during the hold
pub struct ThreadScheduler {
    jobs: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancelToken,
    counters: Arc<JobCounters>,
}

impl ThreadScheduler {
    /// Start `threads` workers named `pool-worker-<n>`
    pub fn new(pool: Arc<ResourcePool>, threads: usize) -> PoolResult<Self> {
        Self::with_name_prefix(pool, threads, "pool-worker")
    }

    pub fn with_name_prefix(pool: Arc<ResourcePool>, threads: usize, prefix: &str) -> PoolResult<Self> {
        let (jobs, receiver) = channel::unbounded::<Job>();
        let cancel = CancelToken::new();
        let counters = Arc::new(JobCounters::default());
        let mut workers = Vec::with_capacity(threads);

        for id in 1..=threads {
            let receiver = receiver.clone();
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            let counters = Arc::clone(&counters);

            let worker = thread::Builder::new()
                .name(format!("{}-{}", prefix, id))
                .spawn(move || {
                    loop {
                        // Once cancelled, keep draining so queued jobs are still
                        // run (and fail fast), logged and counted
                        let next = select! {
                            recv(receiver) -> job => job.ok(),
                            recv(cancel.receiver()) -> _ => receiver.try_recv().ok(),
                        };
                        let Some(job) = next else { break };

                        let label = job.label().to_string();
                        let result = run_guarded(job, &pool, &cancel);
                        match &result {
                            Ok(_) => {}
                            Err(PoolError::TaskFailed(reason)) => {
                                error!(worker = %label, reason = %reason, "job aborted");
                            }
                            Err(err) => {
                                warn!(worker = %label, error = %err, "job failed");
                            }
                        }
                        counters.finished(&result);
                    }
                })
                .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;

            workers.push(worker);
        }

        info!(threads, prefix, "thread scheduler started");

        Ok(Self {
            jobs,
            workers,
            cancel,
            counters,
        })
    }

    /// Token shared by every job this scheduler runs
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Scheduler for ThreadScheduler {
    type Completion = ();

    fn submit(&self, job: Job) -> PoolResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::SchedulerClosed);
        }

        self.counters.started();
        self.jobs.send(job).map_err(|_| {
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            PoolError::SchedulerClosed
        })
    }

    fn shutdown(self, grace: Duration) -> ShutdownReport {
        let Self {
            jobs,
            workers,
            cancel,
            counters,
        } = self;

        // Workers exit once the queue is drained and disconnected
        drop(jobs);

        let forced = !wait_until(grace, || workers.iter().all(JoinHandle::is_finished));
        if forced {
            warn!(grace = ?grace, "thread scheduler did not finish in time, cancelling outstanding jobs");
            cancel.cancel();
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("worker thread terminated abnormally");
            }
        }

        let report = counters.report(forced);
        info!(completed = report.completed, failed = report.failed, forced, "thread scheduler stopped");
        report
    }
}

/// Completion of a job submitted to a [`TaskScheduler`]
#[derive(Debug)]
pub struct TaskHandle {
    label: String,
    join: tokio::task::JoinHandle<PoolResult<WorkerReport>>,
}

impl TaskHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the job. Failures are logged here and returned as `Err`.
    pub async fn outcome(self) -> PoolResult<WorkerReport> {
        let result = match self.join.await {
            Ok(result) => result,
            Err(err) => Err(PoolError::TaskFailed(err.to_string())),
        };

        if let Err(err) = &result {
            warn!(worker = %self.label, error = %err, "deferred task failed");
        }

        result
    }
}

/// Deferred mode: jobs run as blocking tasks on a tokio runtime whose
/// blocking pool is capped at the requested worker count.
///
/// Drop or shut it down from synchronous code, never from inside an async
/// context.
pub struct TaskScheduler {
    runtime: Runtime,
    pool: Arc<ResourcePool>,
    cancel: CancelToken,
    counters: Arc<JobCounters>,
}

impl TaskScheduler {
    pub fn new(pool: Arc<ResourcePool>, workers: usize) -> PoolResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("pool-task")
            .enable_all()
            .build()
            .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;

        info!(workers, "task scheduler started");

        Ok(Self {
            runtime,
            pool,
            cancel: CancelToken::new(),
            counters: Arc::new(JobCounters::default()),
        })
    }

    /// Block the calling thread until `handle` resolves
    pub fn wait(&self, handle: TaskHandle) -> PoolResult<WorkerReport> {
        self.runtime.block_on(handle.outcome())
    }

    /// Token shared by every job this scheduler runs
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Scheduler for TaskScheduler {
    type Completion = TaskHandle;

    fn submit(&self, job: Job) -> PoolResult<TaskHandle> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::SchedulerClosed);
        }

        let label = job.label().to_string();
        let pool = Arc::clone(&self.pool);
        let cancel = self.cancel.clone();
        let counters = Arc::clone(&self.counters);

        counters.started();
        let join = self.runtime.spawn_blocking(move || {
            let result = run_guarded(job, &pool, &cancel);
            counters.finished(&result);
            result
        });

        Ok(TaskHandle { label, join })
    }

    fn shutdown(self, grace: Duration) -> ShutdownReport {
        let counters = Arc::clone(&self.counters);

        let forced = !wait_until(grace, || counters.in_flight.load(Ordering::SeqCst) == 0);
        if forced {
            warn!(grace = ?grace, "task scheduler did not finish in time, cancelling outstanding jobs");
            self.cancel.cancel();
        }

        // Blocking tasks still queued at this point are dropped by tokio and
        // show up as in-flight leftovers in the report
        self.runtime.shutdown_timeout(grace.min(RUNTIME_DRAIN_LIMIT));

        let report = counters.report(forced);
        info!(completed = report.completed, failed = report.failed, forced, "task scheduler stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: usize) -> Arc<ResourcePool> {
        Arc::new(ResourcePool::with_capacity(capacity).unwrap())
    }

    #[test]
    fn test_thread_scheduler_runs_all_jobs() {
        let pool = pool(2);
        let scheduler = ThreadScheduler::new(Arc::clone(&pool), 3).unwrap();

        for i in 0..6 {
            scheduler
                .submit(Job::new(format!("job-{}", i), Duration::from_millis(5)))
                .unwrap();
        }

        let report = scheduler.shutdown(Duration::from_secs(5));
        assert_eq!(report, ShutdownReport { completed: 6, failed: 0, forced: false });
        assert_eq!(pool.available_count(), 2);
    }

    #[test]
    fn test_thread_scheduler_survives_panicking_job() {
        let pool = pool(1);
        let scheduler = ThreadScheduler::new(Arc::clone(&pool), 1).unwrap();

        scheduler
            .submit(Job::new("bad", Duration::ZERO).with_work(|_| panic!("boom")))
            .unwrap();
        scheduler.submit(Job::new("good", Duration::ZERO)).unwrap();

        let report = scheduler.shutdown(Duration::from_secs(5));
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_thread_scheduler_forced_shutdown() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();
        let scheduler = ThreadScheduler::new(Arc::clone(&pool), 2).unwrap();

        scheduler.submit(Job::new("stuck", Duration::ZERO)).unwrap();

        let report = scheduler.shutdown(Duration::from_millis(50));
        assert!(report.forced);
        assert_eq!(report.failed, 1);
        assert_eq!(pool.waiting_count(), 0);

        pool.release(held);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_task_handle_reports_success() {
        let pool = pool(1);
        let scheduler = TaskScheduler::new(Arc::clone(&pool), 2).unwrap();

        let handle = scheduler.submit(Job::new("task", Duration::from_millis(5))).unwrap();
        assert_eq!(handle.label(), "task");

        assert!(wait_until(Duration::from_secs(5), || handle.is_finished()));
        let report = scheduler.wait(handle).unwrap();
        assert_eq!(report.handle_id, 1);

        let shutdown = scheduler.shutdown(Duration::from_secs(1));
        assert_eq!(shutdown.completed, 1);
        assert!(!shutdown.forced);
    }

    #[test]
    fn test_task_handle_surfaces_failure() {
        let pool = pool(1);
        let scheduler = TaskScheduler::new(Arc::clone(&pool), 2).unwrap();

        let failing = scheduler
            .submit(Job::new("panics", Duration::ZERO).with_work(|_| panic!("exploded")))
            .unwrap();

        assert_eq!(
            scheduler.wait(failing),
            Err(PoolError::TaskFailed("exploded".to_string()))
        );
        assert_eq!(pool.available_count(), 1);

        let report = scheduler.shutdown(Duration::from_secs(1));
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_task_scheduler_forced_shutdown_cancels_waiters() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();
        let scheduler = TaskScheduler::new(Arc::clone(&pool), 2).unwrap();

        let _handle = scheduler.submit(Job::new("stuck", Duration::ZERO)).unwrap();

        let report = scheduler.shutdown(Duration::from_millis(50));
        assert!(report.forced);
        assert_eq!(pool.waiting_count(), 0);

        pool.release(held);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_thread_scheduler_forced_shutdown_accounts_for_backlog() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();
        let scheduler = ThreadScheduler::new(Arc::clone(&pool), 1).unwrap();

        for i in 0..4 {
            scheduler
                .submit(Job::new(format!("queued-{}", i), Duration::ZERO))
                .unwrap();
        }

        let report = scheduler.shutdown(Duration::from_millis(50));
        assert!(report.forced);
        assert_eq!(report.completed, 0);
        assert_eq!(report.completed + report.failed, 4);

        pool.release(held);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_task_scheduler_forced_shutdown_accounts_for_backlog() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();
        let scheduler = TaskScheduler::new(Arc::clone(&pool), 1).unwrap();

        let handles = scheduler
            .submit_all((0..4).map(|i| Job::new(format!("queued-{}", i), Duration::ZERO)))
            .unwrap();
        assert_eq!(handles.len(), 4);

        let report = scheduler.shutdown(Duration::from_millis(50));
        assert!(report.forced);
        assert_eq!(report.completed, 0);
        assert_eq!(report.completed + report.failed, 4);

        pool.release(held);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_wait_until_with_unrepresentable_grace() {
        let mut polls = 0;
        assert!(wait_until(Duration::MAX, || {
            polls += 1;
            polls == 3
        }));
    }

    #[test]
    fn test_shutdown_with_max_grace() {
        let pool = pool(1);
        let threads = ThreadScheduler::new(Arc::clone(&pool), 1).unwrap();
        threads.submit(Job::new("quick", Duration::ZERO)).unwrap();
        let report = threads.shutdown(Duration::MAX);
        assert_eq!(report, ShutdownReport { completed: 1, failed: 0, forced: false });

        let tasks = TaskScheduler::new(Arc::clone(&pool), 1).unwrap();
        let handle = tasks.submit(Job::new("quick", Duration::ZERO)).unwrap();
        assert!(tasks.wait(handle).is_ok());
        let report = tasks.shutdown(Duration::MAX);
        assert_eq!(report, ShutdownReport { completed: 1, failed: 0, forced: false });
    }

    #[test]
    fn test_submit_after_cancel_is_refused() {
        let scheduler = ThreadScheduler::new(pool(1), 1).unwrap();
        scheduler.cancel_token().cancel();

        assert_eq!(
            scheduler.submit(Job::new("late", Duration::ZERO)),
            Err(PoolError::SchedulerClosed)
        );
        scheduler.shutdown(Duration::from_millis(10));
    }
}
