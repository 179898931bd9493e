//! End-to-end scenarios: many workers sharing one pool through both
//! scheduling strategies.

use esox_resourcepool::{
    CancelToken, Job, PoolConfiguration, PoolError, ResourcePool, Scheduler, TaskScheduler,
    ThreadScheduler,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const HOLD: Duration = Duration::from_millis(300);

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

fn demo_pool() -> Arc<ResourcePool> {
    Arc::new(ResourcePool::new(PoolConfiguration::new().with_capacity(5)).unwrap())
}

#[test]
fn seven_thread_workers_share_five_handles() {
    init_tracing();
    let pool = demo_pool();
    let scheduler = ThreadScheduler::new(Arc::clone(&pool), 7).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 1..=7 {
        let seen = Arc::clone(&seen);
        let job = Job::new(format!("thread-{}", i), HOLD).with_work(move |handle| {
            seen.lock().unwrap().push(handle.id());
            Ok(())
        });
        scheduler.submit(job).unwrap();
    }

    let report = scheduler.shutdown(Duration::from_secs(10));
    assert_eq!(report.completed, 7);
    assert_eq!(report.failed, 0);
    assert!(!report.forced);

    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_acquired, 7);
    assert_eq!(metrics.total_released, 7);
    assert_eq!(metrics.contended_acquires, 2);
    assert_eq!(pool.available_count(), 5);
    assert_eq!(pool.in_use_count(), 0);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 7);
    assert!(seen.iter().all(|id| (1..=5).contains(id)));
}

#[test]
fn seven_deferred_tasks_share_five_handles() {
    init_tracing();
    let pool = demo_pool();
    let scheduler = TaskScheduler::new(Arc::clone(&pool), 7).unwrap();

    let handles = scheduler
        .submit_all((1..=7).map(|i| Job::new(format!("task-{}", i), HOLD)))
        .unwrap();

    let reports: Vec<_> = handles
        .into_iter()
        .map(|handle| scheduler.wait(handle).unwrap())
        .collect();

    let immediate = reports
        .iter()
        .filter(|r| r.waited < HOLD / 2)
        .count();
    let blocked = reports
        .iter()
        .filter(|r| r.waited >= HOLD / 2)
        .count();
    assert_eq!(immediate, 5);
    assert_eq!(blocked, 2);

    let report = scheduler.shutdown(Duration::from_secs(10));
    assert_eq!(report.completed, 7);
    assert_eq!(pool.available_count(), 5);
}

#[test]
fn deferred_failure_is_observable() {
    init_tracing();
    let pool = demo_pool();
    let scheduler = TaskScheduler::new(Arc::clone(&pool), 2).unwrap();

    let handle = scheduler
        .submit(
            Job::new("failing", Duration::ZERO)
                .with_work(|_| Err(PoolError::TaskFailed("backend unavailable".to_string()))),
        )
        .unwrap();

    assert_eq!(
        scheduler.wait(handle),
        Err(PoolError::TaskFailed("backend unavailable".to_string()))
    );
    assert_eq!(pool.available_count(), 5);
    scheduler.shutdown(Duration::from_secs(1));
}

#[test]
fn handoff_at_capacity_one() {
    init_tracing();
    let pool = Arc::new(ResourcePool::with_capacity(1).unwrap());
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire().unwrap())
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    let status = pool.get_status();
    assert!(!status.is_healthy());
    assert_eq!(status.waiting, 1);

    pool.release(held);
    let handle = waiter.join().unwrap();
    assert_eq!(handle.name(), "Connection 1");
    pool.release(handle);
    assert_eq!(pool.available_count(), 1);
}

#[test]
fn cancelling_many_waiters_keeps_capacity() {
    init_tracing();
    let pool = Arc::new(ResourcePool::with_capacity(2).unwrap());
    let token = CancelToken::new();
    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let token = token.clone();
            thread::spawn(move || pool.acquire_cancellable(&token))
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    token.cancel();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
    }

    pool.release(first);
    pool.release(second);
    assert_eq!(pool.available_count(), 2);
    assert_eq!(pool.get_metrics().cancelled_waits, 4);
}

#[test]
fn global_pool_is_shared_across_threads() {
    let pools: Vec<_> = (0..16)
        .map(|_| thread::spawn(ResourcePool::global))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect();

    assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
    assert_eq!(pools[0].capacity(), 5);
}
