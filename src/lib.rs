//! # EsoxSolutions.ConnectionPool
//!
//! Thread-safe pool of expensive, reusable connection-like resources such
//! as database sessions.
//!
//! ## Features
//!
//! - Lazy, bounded creation between `min_size` and `max_size` resources
//! - Most-recently-returned reuse of idle resources
//! - Health checks on borrow and return, dead resources are discarded
//! - Background sweeper evicting idle or unhealthy resources
//! - Pool-wide default features and properties
//! - Per-borrow setting overrides, restored on return
//! - Automatic return of resources via RAII (Drop trait)
//! - Async borrowing for tokio callers
//! - Health monitoring and metrics
//! - Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connectionpool::{Pool, PoolConfiguration, PropertyValue, Resource, ResourceError};
//! use std::time::Duration;
//!
//! struct Session {
//!     read_only: bool,
//! }
//!
//! impl Resource for Session {
//!     fn is_healthy(&self) -> bool { true }
//!     fn reset(&mut self) -> Result<(), ResourceError> { Ok(()) }
//!     fn close(&mut self) -> Result<(), ResourceError> { Ok(()) }
//!     fn feature(&self, _name: &str) -> Result<bool, ResourceError> { Ok(self.read_only) }
//!     fn set_feature(&mut self, _name: &str, value: bool) -> Result<(), ResourceError> {
//!         self.read_only = value;
//!         Ok(())
//!     }
//!     fn property(&self, name: &str) -> Result<PropertyValue, ResourceError> {
//!         Err(format!("unknown property {}", name).into())
//!     }
//!     fn set_property(&mut self, name: &str, _value: PropertyValue) -> Result<(), ResourceError> {
//!         Err(format!("unknown property {}", name).into())
//!     }
//! }
//!
//! let config = PoolConfiguration::new("sqlite", "file::memory:").with_max_size(4);
//! let pool = Pool::new(config, |_: &str, _: &str, _: Duration| {
//!     Ok::<_, ResourceError>(Session { read_only: false })
//! })
//! .unwrap();
//!
//! {
//!     let session = pool.borrow_with_feature("readOnly", true).unwrap();
//!     assert!(session.feature("readOnly").unwrap());
//!     // Session goes back to the pool, read-only switched off again
//! }
//!
//! assert_eq!(pool.idle(), 1);
//! ```

mod pool;
mod config;
mod resource;
mod settings;
mod metrics;
mod health;
mod eviction;
mod errors;

pub use pool::{Pool, PooledResource};
pub use config::PoolConfiguration;
pub use resource::{PropertyValue, Resource, ResourceError, ResourceFactory, ResourceId};
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use errors::{PoolError, PoolResult};
