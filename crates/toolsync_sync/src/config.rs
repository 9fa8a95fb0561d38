//! `toolsync.json` configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toolsync_core::ServiceSlug;
use toolsync_transport::{
    AuthConfig, DEFAULT_ENV_ALLOWLIST, PoolConfig, ServerSpec, ServiceConfig, TransportConfig,
    TransportSelector,
};

/// Configuration errors. Any of these fails the whole run before a service
/// is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Cannot read config {path}: {reason}")]
    Read {
        /// Path involved
        path: String,
        /// Underlying error
        reason: String,
    },

    /// File is not valid configuration JSON
    #[error("Invalid config {path}: {reason}")]
    Parse {
        /// Path involved
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Structurally valid but semantically wrong
    #[error("Invalid config field {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// What is wrong
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Pool timings in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Idle eviction window
    pub idle_timeout_ms: u64,
    /// Maximum wait for a checked-out connection
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 300_000,
            acquire_timeout_ms: 30_000,
        }
    }
}

fn default_env_allowlist() -> Vec<String> {
    DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".toolsync")
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsyncConfig {
    /// Services by name, in declaration order
    #[serde(default)]
    pub servers: IndexMap<String, ServerSpec>,
    /// Whether local server processes may be spawned
    #[serde(default)]
    pub allow_stdio_exec: bool,
    /// Host variables passed to local server processes
    #[serde(default = "default_env_allowlist")]
    pub env_allowlist: Vec<String>,
    /// Root of the generated source tree
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Root of the snapshot store
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Connection pool timings
    #[serde(default)]
    pub pool: PoolSettings,
}

impl Default for ToolsyncConfig {
    fn default() -> Self {
        Self {
            servers: IndexMap::new(),
            allow_stdio_exec: false,
            env_allowlist: default_env_allowlist(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            pool: PoolSettings::default(),
        }
    }
}

impl ToolsyncConfig {
    /// Empty configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, spec: ServerSpec) -> Self {
        self.servers.insert(name.into(), spec);
        self
    }

    /// Set the local execution policy
    #[must_use]
    pub fn with_allow_stdio_exec(mut self, allow: bool) -> Self {
        self.allow_stdio_exec = allow;
        self
    }

    /// Set output and state roots
    #[must_use]
    pub fn with_dirs(
        mut self,
        output_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        self.output_dir = output_dir.into();
        self.state_dir = state_dir.into();
        self
    }

    /// Parse from JSON text
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the text is not valid configuration
    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load, validate, and resolve relative directories against the file's
    /// own directory
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_json_str(&text, &path.display().to_string())?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.output_dir = base.join(&config.output_dir);
            config.state_dir = base.join(&config.state_dir);
        }
        Ok(config)
    }

    /// Check semantic constraints
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut slugs: HashMap<ServiceSlug, &str> = HashMap::new();
        for (name, spec) in &self.servers {
            let field = format!("servers.{}", name);
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("servers", "server name must not be empty"));
            }
            let slug = ServiceSlug::from_name(name);
            if let Some(other) = slugs.insert(slug.clone(), name) {
                return Err(ConfigError::invalid(
                    field,
                    format!("directory name '{}' collides with server '{}'", slug, other),
                ));
            }
            match &spec.transport {
                TransportConfig::Stdio { command, .. } if command.trim().is_empty() => {
                    return Err(ConfigError::invalid(
                        format!("{}.transport.command", field),
                        "command must not be empty",
                    ));
                }
                TransportConfig::Http { url }
                    if !(url.starts_with("http://") || url.starts_with("https://")) =>
                {
                    return Err(ConfigError::invalid(
                        format!("{}.transport.url", field),
                        "url must use http or https",
                    ));
                }
                _ => {}
            }
            if let Some(AuthConfig::Bearer { credential_env_var }) = &spec.auth
                && credential_env_var.trim().is_empty()
            {
                return Err(ConfigError::invalid(
                    format!("{}.auth.credentialEnvVar", field),
                    "variable name must not be empty",
                ));
            }
        }
        if self.pool.acquire_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "pool.acquireTimeoutMs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Configured services in declaration order
    #[must_use]
    pub fn services(&self) -> Vec<ServiceConfig> {
        self.servers
            .iter()
            .map(|(name, spec)| ServiceConfig::from_spec(name.clone(), spec.clone()))
            .collect()
    }

    /// Pool timings
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .with_idle_timeout(Duration::from_millis(self.pool.idle_timeout_ms))
            .with_acquire_timeout(Duration::from_millis(self.pool.acquire_timeout_ms))
    }

    /// Transport selector carrying the execution policy
    #[must_use]
    pub fn selector(&self) -> TransportSelector {
        TransportSelector::new()
            .with_allow_stdio_exec(self.allow_stdio_exec)
            .with_env_allowlist(self.env_allowlist.clone())
    }
}
