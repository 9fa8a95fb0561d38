//! Per-service transport and authentication declarations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a service is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawn a local process and speak over its stdin/stdout
    Stdio {
        /// Executable
        command: String,
        /// Arguments
        #[serde(default)]
        args: Vec<String>,
        /// Explicit environment entries for the child
        #[serde(default)]
        env: IndexMap<String, String>,
    },
    /// POST JSON-RPC to a remote endpoint
    Http {
        /// Endpoint URL
        url: String,
    },
}

impl TransportConfig {
    /// Stdio transport with no arguments or environment
    #[must_use]
    pub fn stdio(command: impl Into<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args: Vec::new(),
            env: IndexMap::new(),
        }
    }

    /// HTTP transport
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http { url: url.into() }
    }

    /// Short kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
        }
    }
}

/// Authentication declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// No credential
    None,
    /// Bearer token read from an environment variable
    Bearer {
        /// Variable holding the token
        #[serde(rename = "credentialEnvVar")]
        credential_env_var: String,
    },
}

/// A server entry as written in configuration, keyed by name elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Transport declaration
    pub transport: TransportConfig,
    /// Optional authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

/// One configured service. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Unique service name
    pub name: String,
    /// Transport declaration
    pub transport: TransportConfig,
    /// Optional authentication
    pub auth: Option<AuthConfig>,
}

impl ServiceConfig {
    /// Create a service with no authentication
    #[must_use]
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            auth: None,
        }
    }

    /// Build from a named configuration entry
    #[must_use]
    pub fn from_spec(name: impl Into<String>, spec: ServerSpec) -> Self {
        Self {
            name: name.into(),
            transport: spec.transport,
            auth: spec.auth,
        }
    }

    /// Require a bearer credential from `var`
    #[must_use]
    pub fn with_bearer(mut self, var: impl Into<String>) -> Self {
        self.auth = Some(AuthConfig::Bearer {
            credential_env_var: var.into(),
        });
        self
    }

    /// Name of the credential variable, if bearer auth is declared
    #[must_use]
    pub fn credential_env_var(&self) -> Option<&str> {
        match &self.auth {
            Some(AuthConfig::Bearer { credential_env_var }) => Some(credential_env_var),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stdio_spec() {
        let spec: ServerSpec = serde_json::from_value(json!({
            "transport": {
                "type": "stdio",
                "command": "npx",
                "args": ["-y", "server"],
                "env": {"B": "2", "A": "1"}
            },
            "auth": {"type": "bearer", "credentialEnvVar": "GITHUB_TOKEN"}
        }))
        .unwrap();
        let service = ServiceConfig::from_spec("github", spec);

        assert_eq!(service.transport.kind(), "stdio");
        assert_eq!(service.credential_env_var(), Some("GITHUB_TOKEN"));
        let TransportConfig::Stdio { env, .. } = &service.transport else {
            panic!("expected stdio");
        };
        assert_eq!(env.keys().collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn test_parse_http_spec_without_auth() {
        let spec: ServerSpec = serde_json::from_value(json!({
            "transport": {"type": "http", "url": "https://api.test/mcp"}
        }))
        .unwrap();
        assert_eq!(spec.transport, TransportConfig::http("https://api.test/mcp"));
        assert!(spec.auth.is_none());
    }

    #[test]
    fn test_auth_none_has_no_variable() {
        let spec: ServerSpec = serde_json::from_value(json!({
            "transport": {"type": "http", "url": "https://api.test"},
            "auth": {"type": "none"}
        }))
        .unwrap();
        assert_eq!(ServiceConfig::from_spec("x", spec).credential_env_var(), None);
    }
}
