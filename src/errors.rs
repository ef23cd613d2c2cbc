//! Error types for the connection pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool has been shut down")]
    PoolShutDown,

    #[error("Pool for '{kind}' is exhausted - no capacity left")]
    PoolExhausted { kind: String },

    #[error("Setting not found: {0}")]
    SettingNotFound(String),

    #[error("Default settings can not be changed after the first resource was created")]
    InvalidAfterFirstResource,

    #[error("Pool consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource error for '{kind}': {message}")]
    Resource { kind: String, message: String },
}

impl PoolError {
    /// Whether the error signals a broken invariant rather than a
    /// condition the caller can recover from.
    ///
    /// ```
    /// use esox_connectionpool::PoolError;
    ///
    /// assert!(PoolError::ConsistencyViolation("unknown".into()).is_fatal());
    /// assert!(!PoolError::PoolExhausted { kind: "sqlite".into() }.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::ConsistencyViolation(_))
    }

    pub(crate) fn resource(kind: &str, err: impl std::fmt::Display) -> Self {
        PoolError::Resource {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
