//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Snapshot of a pool's counters
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultObjectPool, DefaultPolicy, ObjectPool};
///
/// let pool = DefaultObjectPool::<Vec<u8>, _>::new(DefaultPolicy, 4);
///
/// let obj = pool.get().unwrap();
/// pool.return_object(obj);
/// let _again = pool.get().unwrap();
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.total_reused, 1);
/// assert_eq!(metrics.total_retained, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct PoolMetrics {
    /// Objects built by the policy
    pub total_created: usize,

    /// `get` calls served from the idle cache
    pub total_reused: usize,

    /// Returned objects kept for reuse
    pub total_retained: usize,

    /// Returned objects dropped (pool full or reset rejected)
    pub total_discarded: usize,

    /// Objects whose disposal hook ran
    pub total_disposed: usize,

    /// Idle objects currently held
    pub idle_objects: usize,

    /// Maximum idle objects
    pub capacity: usize,

    /// Share of `get` calls served from the cache (0.0 to 1.0)
    pub hit_rate: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_reused".to_string(), self.total_reused.to_string());
        metrics.insert("total_retained".to_string(), self.total_retained.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("total_disposed".to_string(), self.total_disposed.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("hit_rate".to_string(), format!("{:.2}", self.hit_rate));
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
    /// use scoped_objectpool::{DefaultObjectPool, DefaultPolicy, MetricsExporter, ObjectPool};
    /// use std::collections::HashMap;
    ///
    /// let pool = DefaultObjectPool::<String, _>::new(DefaultPolicy, 8);
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "strings", Some(&tags));
    /// assert!(output.contains("objectpool_objects_idle"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges: [(&str, &str, String); 3] = [
            (
                "objectpool_objects_idle",
                "Idle objects held by the pool",
                metrics.idle_objects.to_string(),
            ),
            (
                "objectpool_capacity",
                "Maximum idle objects",
                metrics.capacity.to_string(),
            ),
            (
                "objectpool_hit_rate",
                "Share of gets served from the pool",
                format!("{:.2}", metrics.hit_rate),
            ),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }

        let counters = [
            (
                "objectpool_objects_created_total",
                "Objects created by the policy",
                metrics.total_created,
            ),
            (
                "objectpool_objects_reused_total",
                "Gets served from the idle cache",
                metrics.total_reused,
            ),
            (
                "objectpool_objects_retained_total",
                "Returned objects kept",
                metrics.total_retained,
            ),
            (
                "objectpool_objects_discarded_total",
                "Returned objects discarded",
                metrics.total_discarded,
            ),
            (
                "objectpool_objects_disposed_total",
                "Objects disposed",
                metrics.total_disposed,
            ),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub reused: AtomicUsize,
    pub retained: AtomicUsize,
    pub discarded: AtomicUsize,
    pub disposed: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics(&self, idle: usize, capacity: usize) -> PoolMetrics {
        let created = self.created.load(Ordering::Relaxed);
        let reused = self.reused.load(Ordering::Relaxed);
        let total = created + reused;
        let hit_rate = if total > 0 {
            reused as f64 / total as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: created,
            total_reused: reused,
            total_retained: self.retained.load(Ordering::Relaxed),
            total_discarded: self.discarded.load(Ordering::Relaxed),
            total_disposed: self.disposed.load(Ordering::Relaxed),
            idle_objects: idle,
            capacity,
            hit_rate,
        }
    }
}
