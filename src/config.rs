//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Default number of handles in a pool
pub const DEFAULT_CAPACITY: usize = 5;

/// Default prefix for handle names
pub const DEFAULT_HANDLE_PREFIX: &str = "Connection";

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(10)
///     .with_handle_prefix("Session")
///     .with_acquire_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.capacity, 10);
/// assert_eq!(config.acquire_timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Fixed number of handles in circulation
    pub capacity: usize,

    /// Prefix used to name handles (`"<prefix> <id>"`)
    pub handle_prefix: String,

    /// Upper bound on how long `acquire` waits. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            handle_prefix: DEFAULT_HANDLE_PREFIX.to_string(),
            acquire_timeout: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_capacity(1);
    /// assert_eq!(config.capacity, 1);
    /// ```
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the handle name prefix
    pub fn with_handle_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.handle_prefix = prefix.into();
        self
    }

    /// Bound every plain `acquire` call by a timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Check the configuration can build a pool
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}
