//! One-call-per-borrow calling convention over pooled connections.

use crate::config::ServiceConfig;
use crate::connection::TransportError;
use crate::credential::{CredentialResolution, is_authentication_failure};
use crate::introspect::{IntrospectError, Introspector};
use serde_json::Value;

/// Call failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Could not obtain a connection
    #[error(transparent)]
    Connect(#[from] IntrospectError),

    /// The call itself failed
    #[error("call to {operation} on {service} failed: {source}")]
    Call {
        /// Service name
        service: String,
        /// Operation name
        operation: String,
        /// Underlying failure
        source: TransportError,
    },
}

impl CallError {
    /// Whether the service rejected our credential
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::Connect(e) => e.is_authentication(),
            Self::Call { source, .. } => is_authentication_failure(source),
        }
    }
}

/// Invokes single operations, reusing each service's pooled connection
#[derive(Debug, Clone)]
pub struct ServiceCaller {
    introspector: Introspector,
}

impl ServiceCaller {
    /// Create a caller sharing the introspector's pool and policy
    #[must_use]
    pub fn new(introspector: Introspector) -> Self {
        Self { introspector }
    }

    /// Borrow the service's connection, perform exactly one call, and
    /// return the connection to the pool. A failed call closes it instead.
    ///
    /// # Errors
    ///
    /// Returns error if no connection can be obtained or the call fails
    pub async fn call(
        &self,
        service: &ServiceConfig,
        credential: &CredentialResolution,
        operation: &str,
        arguments: Value,
    ) -> Result<Value, CallError> {
        let (mut conn, _) = self.introspector.checkout(service, credential).await?;
        tracing::debug!(service = %service.name, operation = %operation, "calling operation");

        match conn.call_tool(operation, arguments).await {
            Ok(result) => {
                conn.release();
                Ok(result)
            }
            Err(source) => {
                // Remote errors leave the session usable.
                if matches!(source, TransportError::Rpc { .. }) {
                    conn.release();
                } else {
                    conn.discard().await;
                }
                Err(CallError::Call {
                    service: service.name.clone(),
                    operation: operation.to_string(),
                    source,
                })
            }
        }
    }
}
