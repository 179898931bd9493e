//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::ResourcePool;
///
/// let pool = ResourcePool::with_capacity(3).unwrap();
///
/// let handle = pool.acquire().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.in_use, 1);
/// pool.release(handle);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolMetrics {
    /// Total handles handed out
    pub total_acquired: usize,

    /// Total handles put back
    pub total_released: usize,

    /// Acquisitions that found the pool empty and had to wait
    pub contended_acquires: usize,

    /// Waits ended by a cancel token
    pub cancelled_waits: usize,

    /// Waits ended by a deadline
    pub timed_out_waits: usize,

    /// Releases dropped because the pool was already full
    pub discarded_releases: usize,

    /// Handles currently available
    pub available: usize,

    /// Handles currently checked out
    pub in_use: usize,

    /// Callers currently blocked in acquire
    pub waiting: usize,

    /// In-use ratio (0.0 to 1.0)
    pub utilization: f64,

    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("contended_acquires".to_string(), self.contended_acquires.to_string());
        metrics.insert("cancelled_waits".to_string(), self.cancelled_waits.to_string());
        metrics.insert("timed_out_waits".to_string(), self.timed_out_waits.to_string());
        metrics.insert("discarded_releases".to_string(), self.discarded_releases.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("waiting".to_string(), self.waiting.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::ResourcePool;
    /// use std::collections::HashMap;
    ///
    /// let pool = ResourcePool::with_capacity(3).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "db".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("main", Some(&tags));
    /// assert!(output.contains("resourcepool_handles_available{pool=\"main\",service=\"db\"} 3"));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauges
        Self::push_metric(&mut output, "resourcepool_handles_available", "gauge", "Handles currently available", &labels, metrics.available);
        Self::push_metric(&mut output, "resourcepool_handles_in_use", "gauge", "Handles currently checked out", &labels, metrics.in_use);
        Self::push_metric(&mut output, "resourcepool_waiters", "gauge", "Callers blocked in acquire", &labels, metrics.waiting);
        Self::push_metric(&mut output, "resourcepool_capacity", "gauge", "Fixed pool capacity", &labels, metrics.capacity);

        output.push_str("# HELP resourcepool_utilization Pool utilization ratio\n");
        output.push_str("# TYPE resourcepool_utilization gauge\n");
        output.push_str(&format!("resourcepool_utilization{{{}}} {:.2}\n", labels, metrics.utilization));

        // Counters
        Self::push_metric(&mut output, "resourcepool_acquired_total", "counter", "Total handles acquired", &labels, metrics.total_acquired);
        Self::push_metric(&mut output, "resourcepool_released_total", "counter", "Total handles released", &labels, metrics.total_released);
        Self::push_metric(&mut output, "resourcepool_contended_acquires_total", "counter", "Acquisitions that had to wait", &labels, metrics.contended_acquires);
        Self::push_metric(&mut output, "resourcepool_cancelled_waits_total", "counter", "Waits ended by cancellation", &labels, metrics.cancelled_waits);
        Self::push_metric(&mut output, "resourcepool_timed_out_waits_total", "counter", "Waits ended by timeout", &labels, metrics.timed_out_waits);
        Self::push_metric(&mut output, "resourcepool_discarded_releases_total", "counter", "Releases dropped on a full pool", &labels, metrics.discarded_releases);

        output
    }

    fn push_metric(output: &mut String, name: &str, kind: &str, help: &str, labels: &str, value: usize) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub contended_acquires: AtomicUsize,
    pub cancelled_waits: AtomicUsize,
    pub timed_out_waits: AtomicUsize,
    pub discarded_releases: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, available: usize, in_use: usize, waiting: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            contended_acquires: self.contended_acquires.load(Ordering::Relaxed),
            cancelled_waits: self.cancelled_waits.load(Ordering::Relaxed),
            timed_out_waits: self.timed_out_waits.load(Ordering::Relaxed),
            discarded_releases: self.discarded_releases.load(Ordering::Relaxed),
            available,
            in_use,
            waiting,
            utilization,
            capacity,
        }
    }
}
