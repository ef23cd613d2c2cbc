//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Construction parameters for a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new("sqlite", "file::memory:")
///     .with_min_size(2)
///     .with_max_size(8)
///     .with_idle_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.max_size, 8);
/// assert_eq!(config.sweep_period(), Duration::from_millis(7500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfiguration {
    /// Resource kind handed to the factory (e.g. a driver name)
    pub kind: String,

    /// Target descriptor handed to the factory (e.g. a connection string)
    pub target: String,

    /// Number of resources the sweeper never evicts below
    pub min_size: usize,

    /// Upper bound on live resources, idle and active together
    pub max_size: usize,

    /// How long a resource may sit idle before the sweeper reclaims it
    pub idle_timeout: Duration,

    /// Timeout passed to the factory when opening a resource
    pub connect_timeout: Duration,

    /// Sweeper period; `None` means a quarter of the idle timeout
    pub sweep_interval: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            kind: String::new(),
            target: String::new(),
            min_size: 1,
            max_size: 32,
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            sweep_interval: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a configuration for the given resource kind and target
    pub fn new(kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the sweeper period
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Effective sweeper period
    pub fn sweep_period(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.idle_timeout / 4)
    }

    /// Check the parameters for consistency
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfiguration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.sweep_period().is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "sweep period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
