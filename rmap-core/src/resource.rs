//! The resource type returned by storage providers and the resolver.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Typed property bag attached to a resource.
pub type ValueMap = BTreeMap<String, Value>;

/// A resource as seen by the resolution core: a path, the provider-owned
/// properties at that path, and enough of the tree shape (children names)
/// to let `list_children` merge real and synthetic children without a
/// second provider round trip. Also the wire type shared between
/// `rmap-service` and `rmap-client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub resource_type: String,
    pub properties: ValueMap,
    pub children: Vec<String>,
    /// `true` for resources fabricated by the resolver itself for mount
    /// tree interior paths that no provider owns.
    pub synthetic: bool,
}

impl Resource {
    pub fn new(path: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            resource_type: resource_type.into(),
            properties: ValueMap::new(),
            children: Vec::new(),
            synthetic: false,
        }
    }

    pub fn synthetic_at(path: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(path, "sling:syntheticResource")
        }
    }

    pub fn name(&self) -> &str {
        crate::path::name(&self.path)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn string_values(&self, key: &str) -> Vec<String> {
        match self.properties.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.properties.get(key).and_then(Value::as_bool)
    }

    pub fn i64_value(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(Value::as_i64)
    }
}
