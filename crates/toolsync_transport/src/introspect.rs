//! Per-service introspection.
//!
//! Drives one service through
//! `initializing → creating-transport → connecting → connected →
//! listing-operations → completed`, tagging any failure with the stage it
//! happened in and a kind the orchestrator can act on.

use crate::config::ServiceConfig;
use crate::connection::{Connector, TransportError};
use crate::credential::{CredentialResolution, is_authentication_failure};
use crate::env::EnvSource;
use crate::pool::{PoolEntry, PoolRegistry, PooledConnection};
use crate::selector::TransportSelector;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use toolsync_schema::{IntrospectionSnapshot, OperationDefinition, TransportDescriptor};

/// Phrases that mark a listing failure as a lost connection
const CONNECTION_LOSS_PHRASES: &[&str] = &[
    "connection closed",
    "connection reset",
    "connection lost",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
    "not connected",
    "stream ended",
];

/// Introspection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrospectStage {
    /// Nothing done yet
    Initializing,
    /// Applying policy and building the transport handle
    CreatingTransport,
    /// Opening the connection and handshaking
    Connecting,
    /// Connection ready
    Connected,
    /// Fetching and normalizing the operation listing
    ListingOperations,
    /// Snapshot produced
    Completed,
}

impl fmt::Display for IntrospectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::CreatingTransport => "creating-transport",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ListingOperations => "listing-operations",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What went wrong, for outcome handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Refused by local policy; never retried
    Policy,
    /// Could not reach the service, or lost it mid-way
    Connection,
    /// Reached the service but it misbehaved
    Protocol,
    /// The service rejected our credential
    Authentication,
}

/// Introspection failure with stage context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct IntrospectError {
    /// Service name
    pub service: String,
    /// Stage the failure happened in
    pub stage: IntrospectStage,
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable message, already naming the service
    pub message: String,
}

impl IntrospectError {
    fn new(service: &str, stage: IntrospectStage, kind: FailureKind, message: String) -> Self {
        Self {
            service: service.to_string(),
            stage,
            kind,
            message,
        }
    }

    /// Whether the service rejected our credential
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.kind == FailureKind::Authentication
    }
}

fn is_connection_loss(err: &TransportError) -> bool {
    if matches!(err, TransportError::Closed) {
        return true;
    }
    let lower = err.to_string().to_lowercase();
    CONNECTION_LOSS_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Runs introspection for one service at a time
#[derive(Clone)]
pub struct Introspector {
    selector: TransportSelector,
    env: Arc<dyn EnvSource>,
    connector: Arc<dyn Connector>,
    pool: Arc<PoolRegistry>,
}

impl Introspector {
    /// Create an introspector
    #[must_use]
    pub fn new(
        selector: TransportSelector,
        env: Arc<dyn EnvSource>,
        connector: Arc<dyn Connector>,
        pool: Arc<PoolRegistry>,
    ) -> Self {
        Self {
            selector,
            env,
            connector,
            pool,
        }
    }

    /// The pool connections are borrowed from
    #[must_use]
    pub fn pool(&self) -> &Arc<PoolRegistry> {
        &self.pool
    }

    /// Select a transport and borrow a connected entry for `service`.
    ///
    /// # Errors
    ///
    /// Returns a `Policy` failure if selection is refused, otherwise a
    /// `Connection` or `Authentication` failure from the connecting stage.
    pub async fn checkout(
        &self,
        service: &ServiceConfig,
        credential: &CredentialResolution,
    ) -> Result<(PooledConnection, TransportDescriptor), IntrospectError> {
        let name = service.name.as_str();

        tracing::debug!(
            service = %name,
            stage = %IntrospectStage::CreatingTransport,
            "introspection stage"
        );
        let handle = self
            .selector
            .select(service, credential, self.env.as_ref())
            .map_err(|e| {
                IntrospectError::new(
                    name,
                    IntrospectStage::CreatingTransport,
                    FailureKind::Policy,
                    e.to_string(),
                )
            })?;
        let descriptor = handle.descriptor();

        tracing::debug!(
            service = %name,
            stage = %IntrospectStage::Connecting,
            transport = %descriptor.label(),
            "introspection stage"
        );
        let connector = Arc::clone(&self.connector);
        let conn = self
            .pool
            .acquire(name, || async move {
                let connection = connector.connect(name, &handle).await?;
                Ok::<_, TransportError>(PoolEntry::new(connection, handle))
            })
            .await
            .map_err(|e| {
                let kind = if is_authentication_failure(&e) {
                    FailureKind::Authentication
                } else {
                    FailureKind::Connection
                };
                IntrospectError::new(
                    name,
                    IntrospectStage::Connecting,
                    kind,
                    format!("failed to connect to {}: {}", name, root_cause(&e)),
                )
            })?;
        tracing::debug!(
            service = %name,
            stage = %IntrospectStage::Connected,
            "introspection stage"
        );
        Ok((conn, descriptor))
    }

    /// Introspect `service`, producing a normalized snapshot.
    ///
    /// The borrowed connection is returned to the pool unless listing
    /// fails, in which case it is closed.
    ///
    /// # Errors
    ///
    /// Returns the failing stage and its classification
    pub async fn introspect(
        &self,
        service: &ServiceConfig,
        credential: &CredentialResolution,
    ) -> Result<IntrospectionSnapshot, IntrospectError> {
        let name = service.name.as_str();
        tracing::debug!(
            service = %name,
            stage = %IntrospectStage::Initializing,
            "introspection stage"
        );

        let (mut conn, descriptor) = self.checkout(service, credential).await?;

        tracing::debug!(
            service = %name,
            stage = %IntrospectStage::ListingOperations,
            "introspection stage"
        );
        let listed = conn.list_tools().await;
        let raw = match listed {
            Ok(raw) => raw,
            Err(e) => {
                conn.discard().await;
                return Err(self.listing_failure(name, &e));
            }
        };

        let operations = match OperationDefinition::from_raw_list(&raw) {
            Ok(operations) => operations,
            Err(e) => {
                conn.release();
                return Err(IntrospectError::new(
                    name,
                    IntrospectStage::ListingOperations,
                    FailureKind::Protocol,
                    format!("malformed operation listing from {}: {}", name, e),
                ));
            }
        };
        conn.release();

        tracing::info!(
            service = %name,
            stage = %IntrospectStage::Completed,
            operations = operations.len(),
            "introspection complete"
        );
        Ok(IntrospectionSnapshot::new(name, descriptor, operations))
    }

    fn listing_failure(&self, name: &str, err: &TransportError) -> IntrospectError {
        let (kind, message) = if is_authentication_failure(err) {
            (
                FailureKind::Authentication,
                format!("authentication failed while listing operations on {}: {}", name, err),
            )
        } else if is_connection_loss(err) {
            (
                FailureKind::Connection,
                format!("connection lost while listing operations on {}: {}", name, err),
            )
        } else {
            (
                FailureKind::Protocol,
                format!("failed to list operations on {}: {}", name, err),
            )
        };
        IntrospectError::new(name, IntrospectStage::ListingOperations, kind, message)
    }
}

impl fmt::Debug for Introspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Introspector")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

fn root_cause(err: &(dyn Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
