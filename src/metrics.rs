//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{Pool, PoolConfiguration};
/// # use esox_connectionpool::{PropertyValue, Resource, ResourceError};
/// # use std::time::Duration;
/// # struct Conn;
/// # impl Resource for Conn {
/// #     fn is_healthy(&self) -> bool { true }
/// #     fn reset(&mut self) -> Result<(), ResourceError> { Ok(()) }
/// #     fn close(&mut self) -> Result<(), ResourceError> { Ok(()) }
/// #     fn feature(&self, _: &str) -> Result<bool, ResourceError> { Ok(false) }
/// #     fn set_feature(&mut self, _: &str, _: bool) -> Result<(), ResourceError> { Ok(()) }
/// #     fn property(&self, _: &str) -> Result<PropertyValue, ResourceError> { Ok(PropertyValue::Int(0)) }
/// #     fn set_property(&mut self, _: &str, _: PropertyValue) -> Result<(), ResourceError> { Ok(()) }
/// # }
///
/// let factory = |_: &str, _: &str, _: Duration| Ok::<_, ResourceError>(Conn);
/// let pool = Pool::new(PoolConfiguration::new("test", "local"), factory).unwrap();
///
/// {
///     let _conn = pool.borrow().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_borrowed, 1);
///     assert_eq!(metrics.total_created, 1);
///     assert_eq!(metrics.active_resources, 1);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total successful borrows
    pub total_borrowed: usize,

    /// Total resources returned to idle
    pub total_returned: usize,

    /// Total resources opened by the factory
    pub total_created: usize,

    /// Total resources discarded (unhealthy, evicted or shut down)
    pub total_destroyed: usize,

    /// Resources removed by the sweeper
    pub total_evicted: usize,

    /// Number of borrows refused for lack of capacity
    pub exhausted_events: usize,

    /// Number of failed factory or customization calls
    pub creation_failures: usize,

    /// Current checked-out resources
    pub active_resources: usize,

    /// Current idle resources
    pub idle_resources: usize,

    /// Current live resources, idle and active
    pub allocated_resources: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum pool capacity
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_evicted".to_string(), self.total_evicted.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert("active_resources".to_string(), self.active_resources.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("allocated_resources".to_string(), self.allocated_resources.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = tags.cloned().unwrap_or_default();
        labels.insert("pool".to_string(), pool_name.to_string());
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        let gauges = [
            ("connpool_resources_active", "Current checked-out resources", metrics.active_resources),
            ("connpool_resources_idle", "Current idle resources", metrics.idle_resources),
            ("connpool_resources_allocated", "Current live resources", metrics.allocated_resources),
            ("connpool_capacity", "Maximum pool capacity", metrics.max_capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(opts("connpool_utilization", "Pool utilization ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("connpool_borrowed_total", "Total resources borrowed", metrics.total_borrowed),
            ("connpool_returned_total", "Total resources returned", metrics.total_returned),
            ("connpool_created_total", "Total resources created", metrics.total_created),
            ("connpool_destroyed_total", "Total resources destroyed", metrics.total_destroyed),
            ("connpool_evicted_total", "Total resources evicted by the sweeper", metrics.total_evicted),
            ("connpool_exhausted_total", "Borrows refused for lack of capacity", metrics.exhausted_events),
            ("connpool_creation_failures_total", "Failed resource creations", metrics.creation_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_created: AtomicUsize,
    pub total_destroyed: AtomicUsize,
    pub total_evicted: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub creation_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_metrics(
        &self,
        active: usize,
        idle: usize,
        allocated: usize,
        capacity: usize,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            active_resources: active,
            idle_resources: idle,
            allocated_resources: allocated,
            utilization,
            max_capacity: capacity,
        }
    }
}
