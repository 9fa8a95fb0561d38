//! Bearer credential resolution and authentication-failure classification.

use crate::config::AuthConfig;
use crate::connection::TransportError;
use crate::env::EnvSource;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Phrases that mark an error message as an authentication rejection
const AUTH_FAILURE_PHRASES: &[&str] = &[
    "unauthorized",
    "forbidden",
    "invalid token",
    "invalid credentials",
    "authentication failed",
    "access denied",
    "bearer token required",
];

/// Outcome of resolving a service's credential
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialResolution {
    /// No credential is configured
    None,
    /// Credential present (trimmed)
    Resolved(String),
    /// Credential configured but its variable is unset or blank
    Missing(String),
}

impl CredentialResolution {
    /// The token, if resolved
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Resolved(token) => Some(token),
            _ => None,
        }
    }

    /// Name of the missing variable
    #[must_use]
    pub fn missing_var(&self) -> Option<&str> {
        match self {
            Self::Missing(var) => Some(var),
            _ => None,
        }
    }
}

impl fmt::Debug for CredentialResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Resolved(_) => write!(f, "Resolved(<redacted>)"),
            Self::Missing(var) => write!(f, "Missing({:?})", var),
        }
    }
}

/// Resolves credentials from an environment source
#[derive(Clone)]
pub struct CredentialResolver {
    env: Arc<dyn EnvSource>,
}

impl CredentialResolver {
    /// Create a resolver reading from `env`
    #[must_use]
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }

    /// Resolve an optional auth declaration
    #[must_use]
    pub fn resolve(&self, auth: Option<&AuthConfig>) -> CredentialResolution {
        match auth {
            None | Some(AuthConfig::None) => CredentialResolution::None,
            Some(AuthConfig::Bearer { credential_env_var }) => {
                match self.env.var(credential_env_var) {
                    Some(value) if !value.trim().is_empty() => {
                        CredentialResolution::Resolved(value.trim().to_string())
                    }
                    _ => CredentialResolution::Missing(credential_env_var.clone()),
                }
            }
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

/// Whether an HTTP status is an authentication rejection
#[must_use]
pub fn is_authentication_status(status: u16) -> bool {
    status == 401 || status == 403
}

/// Whether a message uses known authentication-failure phrasing
#[must_use]
pub fn is_authentication_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_FAILURE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Whether an error, or anything in its source chain, is an authentication failure
#[must_use]
pub fn is_authentication_failure(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<TransportError>().and_then(TransportError::status)
            && is_authentication_status(status)
        {
            return true;
        }
        if is_authentication_message(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use crate::pool::PoolError;

    fn resolver(env: MapEnv) -> CredentialResolver {
        CredentialResolver::new(Arc::new(env))
    }

    fn bearer(var: &str) -> AuthConfig {
        AuthConfig::Bearer {
            credential_env_var: var.to_string(),
        }
    }

    #[test]
    fn test_resolve_none() {
        let r = resolver(MapEnv::new());
        assert_eq!(r.resolve(None), CredentialResolution::None);
        assert_eq!(r.resolve(Some(&AuthConfig::None)), CredentialResolution::None);
    }

    #[test]
    fn test_resolve_missing_unset_empty_blank() {
        let r = resolver(MapEnv::new().with("EMPTY", "").with("BLANK", "  \t"));
        for var in ["UNSET", "EMPTY", "BLANK"] {
            assert_eq!(
                r.resolve(Some(&bearer(var))),
                CredentialResolution::Missing(var.to_string())
            );
        }
    }

    #[test]
    fn test_resolve_trims_value() {
        let r = resolver(MapEnv::new().with("TOKEN", "  abc \n"));
        let resolution = r.resolve(Some(&bearer("TOKEN")));
        assert_eq!(resolution.token(), Some("abc"));
        assert!(!format!("{:?}", resolution).contains("abc"));
    }

    #[test]
    fn test_classify_status() {
        let err = TransportError::Http {
            status: 401,
            message: "nope".to_string(),
        };
        assert!(is_authentication_failure(&err));
        let err = TransportError::Http {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!is_authentication_failure(&err));
    }

    #[test]
    fn test_classify_phrases() {
        let err = TransportError::ConnectionFailed("Server said: Invalid Token".to_string());
        assert!(is_authentication_failure(&err));
        let err = TransportError::ConnectionFailed("connection refused".to_string());
        assert!(!is_authentication_failure(&err));
    }

    #[test]
    fn test_classify_walks_source_chain() {
        let err = PoolError::Create {
            service: "svc".to_string(),
            source: TransportError::Http {
                status: 403,
                message: String::new(),
            },
        };
        assert!(is_authentication_failure(&err));
    }
}
