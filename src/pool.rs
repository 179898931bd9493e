//! Core resource pool implementation

use crate::cancel::CancelToken;
use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::handle::ResourceHandle;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::status::PoolStatus;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError, select};
use dashmap::DashMap;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static GLOBAL_POOL: OnceLock<Arc<ResourcePool>> = OnceLock::new();
static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

/// A checked-out handle that goes back to the pool when dropped
pub struct PooledHandle<'a> {
    handle: Option<ResourceHandle>,
    pool: &'a ResourcePool,
}

impl<'a> PooledHandle<'a> {
    fn new(handle: ResourceHandle, pool: &'a ResourcePool) -> Self {
        Self {
            handle: Some(handle),
            pool,
        }
    }

    /// Detach the handle; the caller becomes responsible for releasing it
    pub fn into_inner(mut self) -> ResourceHandle {
        self.handle.take().expect("Handle already taken")
    }
}

impl Deref for PooledHandle<'_> {
    type Target = ResourceHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref().expect("Handle already taken")
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}

/// Thread-safe pool with a fixed set of handles.
///
/// Handles live in a bounded channel sized to the capacity. Acquiring is a
/// blocking receive and releasing is a non-blocking send, so the channel can
/// never hold more than `capacity` handles as long as callers only return what
/// they acquired.
pub struct ResourcePool {
    pool_id: usize,
    sender: Sender<ResourceHandle>,
    receiver: Receiver<ResourceHandle>,
    /// Keyed by handle id. Only handles minted by this pool touch it.
    checked_out: DashMap<usize, Instant>,
    waiting: AtomicUsize,
    metrics: MetricsTracker,
    config: PoolConfiguration,
}

impl ResourcePool {
    /// Create a pool holding `config.capacity` handles
    pub fn new(config: PoolConfiguration) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create a pool with default settings and the given capacity
    pub fn with_capacity(capacity: usize) -> PoolResult<Self> {
        Self::new(PoolConfiguration::new().with_capacity(capacity))
    }

    /// The process-wide pool, created with the default configuration on first
    /// use. Every caller, on any thread, gets the same instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::ResourcePool;
    /// use std::sync::Arc;
    ///
    /// let a = ResourcePool::global();
    /// let b = ResourcePool::global();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// ```
    pub fn global() -> Arc<ResourcePool> {
        let pool = GLOBAL_POOL.get_or_init(|| Arc::new(Self::build(PoolConfiguration::default())));
        Arc::clone(pool)
    }

    fn build(config: PoolConfiguration) -> Self {
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = channel::bounded(config.capacity);

        for id in 1..=config.capacity {
            // Freshly created channel sized to capacity, so this never fails
            let _ = sender.try_send(ResourceHandle::new(pool_id, id, &config.handle_prefix));
        }

        info!(capacity = config.capacity, prefix = %config.handle_prefix, "resource pool created");

        Self {
            pool_id,
            sender,
            receiver,
            checked_out: DashMap::new(),
            waiting: AtomicUsize::new(0),
            metrics: MetricsTracker::new(),
            config,
        }
    }

    /// Take a handle, blocking until one is released if the pool is empty.
    ///
    /// Waits forever unless the configuration sets an acquire timeout.
    pub fn acquire(&self) -> PoolResult<ResourceHandle> {
        self.wait_for(None, self.config.acquire_timeout)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`PoolError::Cancelled`] once `token` is cancelled
    pub fn acquire_cancellable(&self, token: &CancelToken) -> PoolResult<ResourceHandle> {
        self.wait_for(Some(token), self.config.acquire_timeout)
    }

    /// Take a handle, waiting at most `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> PoolResult<ResourceHandle> {
        self.wait_for(None, Some(timeout))
    }

    /// Take a handle only if one is free right now
    pub fn try_acquire(&self) -> Option<ResourceHandle> {
        self.receiver.try_recv().ok().map(|handle| self.check_out(handle))
    }

    /// Acquire wrapped in a guard that releases on drop
    pub fn checkout(&self) -> PoolResult<PooledHandle<'_>> {
        self.acquire().map(|handle| PooledHandle::new(handle, self))
    }

    /// Cancellable [`checkout`](Self::checkout)
    pub fn checkout_cancellable(&self, token: &CancelToken) -> PoolResult<PooledHandle<'_>> {
        self.acquire_cancellable(token)
            .map(|handle| PooledHandle::new(handle, self))
    }

    /// Put a handle back. Never blocks; wakes at most one waiting caller.
    ///
    /// Ownership is not validated: a handle from another pool is queued like
    /// any other, but it never clears this pool's checkout bookkeeping.
    pub fn release(&self, handle: ResourceHandle) {
        if handle.pool_id() != self.pool_id {
            debug!(handle = %handle, "released handle belongs to another pool");
        } else if self.checked_out.remove(&handle.id()).is_none() {
            debug!(handle = %handle, "released handle was not checked out");
        }

        match self.sender.try_send(handle) {
            Ok(()) => {
                MetricsTracker::record(&self.metrics.total_released);
            }
            Err(TrySendError::Full(handle)) | Err(TrySendError::Disconnected(handle)) => {
                MetricsTracker::record(&self.metrics.discarded_releases);
                warn!(handle = %handle, capacity = self.capacity(), "pool already full, discarding released handle");
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn available_count(&self) -> usize {
        self.receiver.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.checked_out.len()
    }

    /// Callers currently blocked waiting for a handle
    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn get_metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            self.available_count(),
            self.in_use_count(),
            self.waiting_count(),
            self.capacity(),
        )
    }

    pub fn get_status(&self) -> PoolStatus {
        let longest_hold = self
            .checked_out
            .iter()
            .map(|entry| entry.value().elapsed())
            .max();

        PoolStatus::new(
            self.available_count(),
            self.in_use_count(),
            self.waiting_count(),
            self.capacity(),
            longest_hold,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    fn wait_for(
        &self,
        token: Option<&CancelToken>,
        timeout: Option<Duration>,
    ) -> PoolResult<ResourceHandle> {
        if token.is_some_and(CancelToken::is_cancelled) {
            MetricsTracker::record(&self.metrics.cancelled_waits);
            return Err(PoolError::Cancelled);
        }

        match self.receiver.try_recv() {
            Ok(handle) => return Ok(self.check_out(handle)),
            Err(TryRecvError::Disconnected) => return Err(PoolError::Closed),
            Err(TryRecvError::Empty) => {}
        }

        MetricsTracker::record(&self.metrics.contended_acquires);
        let waiting = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(waiting, "pool exhausted, waiting for a release");

        let never_cancelled = channel::never();
        let cancelled = token.map_or(&never_cancelled, CancelToken::receiver);
        // A deadline too far out to represent is the same as no deadline
        let timer = match timeout.and_then(|timeout| Instant::now().checked_add(timeout)) {
            Some(at) => channel::at(at),
            None => channel::never(),
        };

        // Exactly one arm completes, so a cancelled or expired wait takes nothing
        let outcome = select! {
            recv(self.receiver) -> msg => msg.map_err(|_| PoolError::Closed),
            recv(cancelled) -> _ => Err(PoolError::Cancelled),
            recv(timer) -> _ => Err(PoolError::Timeout(timeout.unwrap_or_default())),
        };

        self.waiting.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(handle) => Ok(self.check_out(handle)),
            Err(err) => {
                match err {
                    PoolError::Cancelled => MetricsTracker::record(&self.metrics.cancelled_waits),
                    PoolError::Timeout(_) => MetricsTracker::record(&self.metrics.timed_out_waits),
                    _ => {}
                }
                debug!(error = %err, "gave up waiting for a handle");
                Err(err)
            }
        }
    }

    fn check_out(&self, handle: ResourceHandle) -> ResourceHandle {
        if handle.pool_id() == self.pool_id {
            self.checked_out.insert(handle.id(), Instant::now());
        }
        MetricsTracker::record(&self.metrics.total_acquired);
        handle
    }
}
