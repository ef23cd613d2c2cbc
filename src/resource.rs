//! Contracts for pooled resources and the factories that open them

use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error raised by a resource or its factory
pub type ResourceError = Box<dyn std::error::Error + Send + Sync>;

/// Stable identity of a pooled resource, never reused within a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value of a resource property
///
/// # Examples
///
/// ```
/// use esox_connectionpool::PropertyValue;
///
/// let timeout: PropertyValue = 30_i64.into();
/// assert_eq!(timeout.as_int(), Some(30));
/// assert_eq!(PropertyValue::from("utf8").as_text(), Some("utf8"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Bytes(value)
    }
}

/// A connection-like resource the pool can manage
///
/// The pool never interprets what a resource does; it only relies on
/// these lifecycle and settings primitives.
pub trait Resource: Send + 'static {
    /// Live health check. Must not panic.
    fn is_healthy(&self) -> bool;

    /// Clear session-local state before the resource goes back to idle
    fn reset(&mut self) -> Result<(), ResourceError>;

    /// Release the underlying connection
    fn close(&mut self) -> Result<(), ResourceError>;

    fn feature(&self, name: &str) -> Result<bool, ResourceError>;

    fn set_feature(&mut self, name: &str, value: bool) -> Result<(), ResourceError>;

    fn property(&self, name: &str) -> Result<PropertyValue, ResourceError>;

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), ResourceError>;
}

/// Opens new resources on behalf of a pool
///
/// Closures with the signature of [`ResourceFactory::create`] implement
/// this trait, which covers most uses:
///
/// ```ignore
/// let factory = |kind: &str, target: &str, timeout: Duration| Connection::open(target, timeout);
/// ```
pub trait ResourceFactory<R: Resource>: Send + Sync + 'static {
    /// Open a resource of `kind` against `target`
    fn create(&self, kind: &str, target: &str, connect_timeout: Duration)
    -> Result<R, ResourceError>;

    /// Hook run on every newly created resource after the pool defaults
    /// were applied
    fn customize(&self, _resource: &mut R) -> Result<(), ResourceError> {
        Ok(())
    }
}

impl<R, F> ResourceFactory<R> for F
where
    R: Resource,
    F: Fn(&str, &str, Duration) -> Result<R, ResourceError> + Send + Sync + 'static,
{
    fn create(
        &self,
        kind: &str,
        target: &str,
        connect_timeout: Duration,
    ) -> Result<R, ResourceError> {
        self(kind, target, connect_timeout)
    }
}
