//! Canonical JSON for deterministic fingerprints and structural comparison.
//!
//! Object keys are sorted lexicographically at every depth, arrays are
//! canonicalized element-wise, and configured volatile keys are dropped at the
//! top level only. Keys listed as set-valued (e.g. `required`) have their array
//! elements sorted as well.

use crate::error::CoreResult;
use crate::hash::Fingerprint;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Canonicalization configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalConfig {
    /// Keys removed from the top-level object before hashing
    pub volatile_keys: Vec<String>,
    /// Keys whose array values are treated as unordered sets
    pub set_valued_keys: Vec<String>,
}

impl CanonicalConfig {
    /// Configuration with no volatile or set-valued keys
    #[must_use]
    pub fn strict() -> Self {
        Self {
            volatile_keys: Vec::new(),
            set_valued_keys: Vec::new(),
        }
    }

    /// Add a volatile key
    #[must_use]
    pub fn with_volatile_key(mut self, key: impl Into<String>) -> Self {
        self.volatile_keys.push(key.into());
        self
    }

    /// Add a set-valued key
    #[must_use]
    pub fn with_set_valued_key(mut self, key: impl Into<String>) -> Self {
        self.set_valued_keys.push(key.into());
        self
    }
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self::strict()
            .with_volatile_key("retrievedAt")
            .with_volatile_key("timestamp")
            .with_set_valued_key("required")
    }
}

/// Produces canonical JSON values, bytes and fingerprints
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    config: CanonicalConfig,
}

impl Canonicalizer {
    /// Create a canonicalizer with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a canonicalizer with a custom configuration
    #[must_use]
    pub fn with_config(config: CanonicalConfig) -> Self {
        Self { config }
    }

    /// Canonicalize a JSON value
    #[must_use]
    pub fn canonicalize(&self, value: Value) -> Value {
        match value {
            Value::Object(mut map) => {
                for key in &self.config.volatile_keys {
                    map.remove(key);
                }
                self.canonicalize_nested(Value::Object(map))
            }
            other => self.canonicalize_nested(other),
        }
    }

    /// Serialize any value and canonicalize the result
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be represented as JSON
    pub fn canonicalize_serializable<T: Serialize>(&self, value: &T) -> CoreResult<Value> {
        Ok(self.canonicalize(serde_json::to_value(value)?))
    }

    /// Canonical compact bytes of a value
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self, value: &Value) -> CoreResult<Vec<u8>> {
        let canonical = self.canonicalize(value.clone());
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// Fingerprint of the canonical form of a serializable value
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn fingerprint<T: Serialize>(&self, value: &T) -> CoreResult<Fingerprint> {
        let canonical = self.canonicalize_serializable(value)?;
        Ok(Fingerprint::compute(&serde_json::to_vec(&canonical)?))
    }

    /// Whether two values are equal once canonicalized
    #[must_use]
    pub fn equivalent(&self, left: &Value, right: &Value) -> bool {
        self.canonicalize(left.clone()) == self.canonicalize(right.clone())
    }

    fn canonicalize_nested(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted = BTreeMap::new();
                for (key, child) in map {
                    let child = self.canonicalize_nested(child);
                    let child = if self.config.set_valued_keys.contains(&key) {
                        Self::sort_array(child)
                    } else {
                        child
                    };
                    sorted.insert(key, child);
                }
                Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.canonicalize_nested(item))
                    .collect(),
            ),
            other => other,
        }
    }

    fn sort_array(value: Value) -> Value {
        match value {
            Value::Array(mut items) => {
                items.sort_by_cached_key(|item| item.to_string());
                Value::Array(items)
            }
            other => other,
        }
    }
}
