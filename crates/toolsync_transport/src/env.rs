//! Environment variable sources.

use std::collections::HashMap;

/// Read-only view of environment variables
pub trait EnvSource: Send + Sync {
    /// Value of a variable, if set
    fn var(&self, name: &str) -> Option<String>;
}

/// The host process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed in-memory environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
