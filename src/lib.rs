//! # EsoxSolutions.ResourcePool
//!
//! Bounded, thread-safe resource pool for Rust: a fixed set of reusable
//! handles shared by many workers that acquire one, use it briefly, and
//! release it.
//!
//! ## Features
//!
//! - Fixed capacity, pre-populated at construction
//! - Blocking acquisition with optional timeout and cancellation
//! - Non-blocking release that wakes at most one waiter
//! - RAII guard that releases on drop
//! - Lazily created process-wide instance
//! - Thread and tokio-task scheduling strategies
//! - Metrics and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::ResourcePool;
//!
//! let pool = ResourcePool::with_capacity(2).unwrap();
//! {
//!     let handle = pool.checkout().unwrap();
//!     println!("Got: {}", *handle);
//!     // Handle automatically released when `handle` goes out of scope
//! }
//! assert_eq!(pool.available_count(), 2);
//! ```

mod cancel;
mod config;
mod errors;
mod handle;
mod metrics;
mod pool;
mod scheduler;
mod status;
mod worker;

pub use cancel::CancelToken;
pub use config::{DEFAULT_CAPACITY, DEFAULT_HANDLE_PREFIX, PoolConfiguration};
pub use errors::{PoolError, PoolResult};
pub use handle::ResourceHandle;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{PooledHandle, ResourcePool};
pub use scheduler::{Scheduler, ShutdownReport, TaskHandle, TaskScheduler, ThreadScheduler};
pub use status::PoolStatus;
pub use worker::{Job, WorkerReport};
