//! Health monitoring for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 0, 10, false);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_resources, 3);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle resources count
    pub idle_resources: usize,

    /// Checked-out resources count
    pub active_resources: usize,

    /// Checked-out resources failing their health check
    pub dead_resources: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Whether the pool was shut down
    pub shut_down: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, active: usize, dead: usize, capacity: usize, shut_down: bool) -> Self {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if shut_down {
            warnings.push("Pool has been shut down".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if dead > 0 {
            warnings.push(format!("{} borrowed resource(s) failing health check", dead));
            is_healthy = false;
        }

        // Informational only: an empty idle list just means the next borrow creates
        if idle == 0 && active < capacity && !shut_down {
            warnings.push("No idle resources".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_resources: idle,
            active_resources: active,
            dead_resources: dead,
            total_capacity: capacity,
            shut_down,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
