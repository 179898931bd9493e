//! Occupancy snapshots for resource pools

use std::time::Duration;

/// Point-in-time view of how a pool is being used
///
/// # Examples
///
/// ```
/// use esox_resourcepool::ResourcePool;
///
/// let pool = ResourcePool::with_capacity(3).unwrap();
///
/// let status = pool.get_status();
/// assert!(status.is_healthy());
/// assert_eq!(status.available, 3);
/// ```
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// False when the pool is exhausted and callers are queued behind it
    pub is_healthy: bool,

    /// In-use ratio (0.0 to 1.0)
    pub utilization: f64,

    pub available: usize,

    pub in_use: usize,

    pub waiting: usize,

    pub capacity: usize,

    /// Longest time any currently checked-out handle has been held
    pub longest_hold: Option<Duration>,

    pub warnings: Vec<String>,
}

impl PoolStatus {
    pub fn new(
        available: usize,
        in_use: usize,
        waiting: usize,
        capacity: usize,
        longest_hold: Option<Duration>,
    ) -> Self {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();

        if available == 0 {
            warnings.push("Pool exhausted".to_string());
        }

        if waiting > 0 {
            warnings.push(format!("{} callers waiting", waiting));
        }

        Self {
            is_healthy: !(available == 0 && waiting > 0),
            utilization,
            available,
            in_use,
            waiting,
            capacity,
            longest_hold,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }
}
