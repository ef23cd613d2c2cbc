//! Pool-wide default settings and per-borrow overrides

use crate::errors::{PoolError, PoolResult};
use crate::resource::{PropertyValue, Resource, ResourceError, ResourceId};
use std::collections::{BTreeMap, HashMap};

/// Baseline features and properties applied to every resource of a pool
#[derive(Debug, Clone, Default)]
pub(crate) struct DefaultSettings {
    features: BTreeMap<String, bool>,
    properties: BTreeMap<String, PropertyValue>,
}

impl DefaultSettings {
    pub fn set_feature(&mut self, name: &str, value: bool) {
        self.features.insert(name.to_string(), value);
    }

    pub fn feature(&self, name: &str) -> PoolResult<bool> {
        self.features
            .get(name)
            .copied()
            .ok_or_else(|| PoolError::SettingNotFound(name.to_string()))
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn property(&self, name: &str) -> PoolResult<PropertyValue> {
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::SettingNotFound(name.to_string()))
    }

    /// Apply all features, then all properties, to `resource`
    pub fn apply_to<R: Resource>(&self, resource: &mut R) -> Result<(), ResourceError> {
        for (name, value) in &self.features {
            resource.set_feature(name, *value)?;
        }
        for (name, value) in &self.properties {
            resource.set_property(name, value.clone())?;
        }
        Ok(())
    }
}

/// Original value of a setting changed for the duration of one borrow
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Override {
    Feature { name: String, original: bool },
    Property { name: String, original: PropertyValue },
}

impl Override {
    /// Record the current value of feature `name` and switch it to `value`
    pub fn feature<R: Resource>(
        resource: &mut R,
        name: &str,
        value: bool,
    ) -> Result<Self, ResourceError> {
        let original = resource.feature(name)?;
        resource.set_feature(name, value)?;
        Ok(Override::Feature {
            name: name.to_string(),
            original,
        })
    }

    /// Record the current value of property `name` and switch it to `value`
    pub fn property<R: Resource>(
        resource: &mut R,
        name: &str,
        value: PropertyValue,
    ) -> Result<Self, ResourceError> {
        let original = resource.property(name)?;
        resource.set_property(name, value)?;
        Ok(Override::Property {
            name: name.to_string(),
            original,
        })
    }

    /// Put the original value back
    pub fn restore<R: Resource>(self, resource: &mut R) -> Result<(), ResourceError> {
        match self {
            Override::Feature { name, original } => resource.set_feature(&name, original),
            Override::Property { name, original } => resource.set_property(&name, original),
        }
    }
}

/// Overrides keyed by the borrowed resource they belong to.
///
/// Entries are consumed when the resource comes back, so an override
/// never outlives the borrow that requested it.
#[derive(Debug, Default)]
pub(crate) struct OverrideTable {
    entries: HashMap<ResourceId, Override>,
}

impl OverrideTable {
    pub fn record(&mut self, id: ResourceId, entry: Override) {
        self.entries.insert(id, entry);
    }

    pub fn take(&mut self, id: ResourceId) -> Option<Override> {
        self.entries.remove(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
