//! Transport selection under the local-execution policy.

use crate::config::{ServiceConfig, TransportConfig};
use crate::credential::CredentialResolution;
use crate::env::EnvSource;
use std::collections::BTreeMap;
use std::fmt;
use toolsync_schema::TransportDescriptor;

/// Host variables passed through to child processes by default
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "TMPDIR",
    "TEMP",
    "TMP",
    "LANG",
    "LC_ALL",
    "TERM",
    "SYSTEMROOT",
    "APPDATA",
    "LOCALAPPDATA",
    "USERPROFILE",
];

/// Applied last to every child environment to keep sub-tooling quiet
const QUIET_OVERRIDES: &[(&str, &str)] = &[
    ("NO_COLOR", "1"),
    ("FORCE_COLOR", "0"),
    ("NPM_CONFIG_UPDATE_NOTIFIER", "false"),
    ("NPM_CONFIG_LOGLEVEL", "error"),
];

/// Selection refused by policy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// Local process execution is not allowed
    #[error(
        "local process execution is disabled; refusing to start service '{service}' (set allowStdioExec to enable)"
    )]
    StdioExecDisabled {
        /// Service name
        service: String,
    },
}

/// Everything needed to open a connection
#[derive(Clone, PartialEq, Eq)]
pub enum TransportHandle {
    /// Child process
    Stdio {
        /// Executable
        command: String,
        /// Arguments
        args: Vec<String>,
        /// Complete child environment (nothing else is inherited)
        env: BTreeMap<String, String>,
    },
    /// Remote endpoint
    Http {
        /// Endpoint URL
        url: String,
        /// Extra request headers
        headers: BTreeMap<String, String>,
    },
}

impl TransportHandle {
    /// Secret-free description for snapshots
    #[must_use]
    pub fn descriptor(&self) -> TransportDescriptor {
        match self {
            Self::Stdio { command, args, .. } => {
                TransportDescriptor::stdio(command.clone(), args.clone())
            }
            Self::Http { url, .. } => TransportDescriptor::http(url),
        }
    }
}

// Values may carry credentials; only keys are printed.
impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio { command, args, env } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("env", &env.keys().collect::<Vec<_>>())
                .finish(),
            Self::Http { url, headers } => f
                .debug_struct("Http")
                .field("url", &TransportDescriptor::http(url).label())
                .field("headers", &headers.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Builds transport handles from service declarations
#[derive(Debug, Clone)]
pub struct TransportSelector {
    allow_stdio_exec: bool,
    env_allowlist: Vec<String>,
}

impl Default for TransportSelector {
    fn default() -> Self {
        Self {
            allow_stdio_exec: false,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TransportSelector {
    /// Selector with local execution disabled and the default allow-list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or forbid spawning local processes
    #[must_use]
    pub fn with_allow_stdio_exec(mut self, allow: bool) -> Self {
        self.allow_stdio_exec = allow;
        self
    }

    /// Replace the environment allow-list
    #[must_use]
    pub fn with_env_allowlist(mut self, names: Vec<String>) -> Self {
        self.env_allowlist = names;
        self
    }

    /// Whether local processes may be spawned
    #[must_use]
    pub fn allows_stdio_exec(&self) -> bool {
        self.allow_stdio_exec
    }

    /// Build a handle for `service`.
    ///
    /// A `Missing` credential is never transmitted.
    ///
    /// # Errors
    ///
    /// Returns `StdioExecDisabled` for a local-process transport when the
    /// policy forbids it. Nothing has been spawned at that point.
    pub fn select(
        &self,
        service: &ServiceConfig,
        credential: &CredentialResolution,
        host: &dyn EnvSource,
    ) -> Result<TransportHandle, SelectError> {
        match &service.transport {
            TransportConfig::Stdio { command, args, env } => {
                if !self.allow_stdio_exec {
                    return Err(SelectError::StdioExecDisabled {
                        service: service.name.clone(),
                    });
                }

                let mut merged = BTreeMap::new();
                for name in &self.env_allowlist {
                    if let Some(value) = host.var(name) {
                        merged.insert(name.clone(), value);
                    }
                }
                for (name, value) in env {
                    merged.insert(name.clone(), value.clone());
                }
                if let (Some(var), Some(token)) =
                    (service.credential_env_var(), credential.token())
                {
                    merged.insert(var.to_string(), token.to_string());
                }
                for (name, value) in QUIET_OVERRIDES {
                    merged.insert((*name).to_string(), (*value).to_string());
                }

                tracing::debug!(
                    service = %service.name,
                    command = %command,
                    vars = merged.len(),
                    "selected stdio transport"
                );
                Ok(TransportHandle::Stdio {
                    command: command.clone(),
                    args: args.clone(),
                    env: merged,
                })
            }
            TransportConfig::Http { url } => {
                let mut headers = BTreeMap::new();
                if let Some(token) = credential.token() {
                    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
                }
                tracing::debug!(
                    service = %service.name,
                    authenticated = !headers.is_empty(),
                    "selected http transport"
                );
                Ok(TransportHandle::Http {
                    url: url.clone(),
                    headers,
                })
            }
        }
    }
}
