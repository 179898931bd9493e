// EsoxSolutions.ResourcePool
// Demo driver: seven workers share a five-handle pool, first on plain
// threads, then as deferred tokio tasks.

use esox_resourcepool::{Job, PoolResult, ResourcePool, Scheduler, TaskScheduler, ThreadScheduler};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WORKERS: usize = 7;
const HOLD: Duration = Duration::from_secs(2);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let pool = ResourcePool::global();

    info!("Running with worker threads...");
    let threads = ThreadScheduler::new(pool.clone(), WORKERS)?;
    threads.submit_all(jobs("thread"))?;
    let report = threads.shutdown(SHUTDOWN_GRACE);
    info!(?report, available = pool.available_count(), "thread run finished");

    info!("Running with deferred tasks...");
    let tasks = TaskScheduler::new(pool.clone(), WORKERS)?;
    let handles = tasks.submit_all(jobs("task"))?;
    for handle in handles {
        let label = handle.label().to_string();
        match tasks.wait(handle) {
            Ok(done) => info!(worker = %label, waited = ?done.waited, "task completed"),
            Err(err) => warn!(worker = %label, error = %err, "task failed"),
        }
    }
    let report = tasks.shutdown(SHUTDOWN_GRACE);
    info!(?report, available = pool.available_count(), "task run finished");

    println!("{}", pool.export_metrics_prometheus("demo", None));
    Ok(())
}

fn jobs(kind: &str) -> impl Iterator<Item = Job> + '_ {
    (1..=WORKERS).map(move |i| Job::new(format!("{}-{}", kind, i), HOLD))
}
