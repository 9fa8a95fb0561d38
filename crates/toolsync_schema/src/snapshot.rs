//! Introspection snapshots and their derived metadata.

use crate::operation::OperationDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolsync_core::{Canonicalizer, CoreResult, Fingerprint};

/// How a service was reached, without any secret material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportDescriptor {
    /// Local child process speaking over stdin/stdout
    Stdio {
        /// Executable
        command: String,
        /// Arguments
        args: Vec<String>,
    },
    /// Remote HTTP endpoint
    Http {
        /// Endpoint URL with credentials, query and fragment stripped
        url: String,
    },
}

impl TransportDescriptor {
    /// Describe a local-process transport
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args,
        }
    }

    /// Describe an HTTP transport, redacting userinfo, query and fragment
    #[must_use]
    pub fn http(url: &str) -> Self {
        Self::Http {
            url: redact_url(url),
        }
    }

    /// Short label for logs and summaries
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Stdio { command, .. } => format!("stdio:{}", command),
            Self::Http { url } => format!("http:{}", url),
        }
    }
}

fn redact_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    match without_query.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, path) = match rest.find('/') {
                Some(pos) => rest.split_at(pos),
                None => (rest, ""),
            };
            let host = authority.rsplit('@').next().unwrap_or(authority);
            format!("{}://{}{}", scheme, host, path)
        }
        None => without_query.to_string(),
    }
}

/// Full normalized record of a service's operations at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectionSnapshot {
    /// Configured service name
    pub service_name: String,
    /// When the listing was retrieved
    pub retrieved_at: DateTime<Utc>,
    /// How the service was reached
    pub transport: TransportDescriptor,
    /// Operations in the order the service listed them
    pub operations: Vec<OperationDefinition>,
}

/// The part of a snapshot that contributes to its fingerprint
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintView<'a> {
    service_name: &'a str,
    operations: Vec<serde_json::Value>,
}

impl IntrospectionSnapshot {
    /// Create a snapshot retrieved now
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        transport: TransportDescriptor,
        operations: Vec<OperationDefinition>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            retrieved_at: Utc::now(),
            transport,
            operations,
        }
    }

    /// Override the retrieval time
    #[must_use]
    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.retrieved_at = retrieved_at;
        self
    }

    /// Content fingerprint of the operation set.
    ///
    /// Stable under key reordering inside schemas, permutation of the
    /// operation list (duplicated names included), and changes to retrieval
    /// time or transport.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be serialized
    pub fn fingerprint(&self) -> CoreResult<Fingerprint> {
        let canonicalizer = Canonicalizer::new();
        let mut keyed = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let value = canonicalizer.canonicalize_serializable(op)?;
            let bytes = serde_json::to_vec(&value)?;
            keyed.push((op.name.as_str(), bytes, value));
        }
        // Ties on name are ordered by canonical content
        keyed.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));
        let view = FingerprintView {
            service_name: &self.service_name,
            operations: keyed.into_iter().map(|(_, _, value)| value).collect(),
        };
        canonicalizer.fingerprint(&view)
    }

    /// Look up an operation by name
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationDefinition> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Operation names in listing order
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name.as_str()).collect()
    }
}

/// Metadata persisted alongside the latest snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Content fingerprint
    pub schema_fingerprint: Fingerprint,
    /// When the snapshot was retrieved
    pub retrieved_at: DateTime<Utc>,
    /// How the service was reached
    pub transport: TransportDescriptor,
    /// Number of operations
    pub operation_count: usize,
}

impl SnapshotMetadata {
    /// Derive metadata from a snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the fingerprint cannot be computed
    pub fn derive(snapshot: &IntrospectionSnapshot) -> CoreResult<Self> {
        Ok(Self {
            schema_fingerprint: snapshot.fingerprint()?,
            retrieved_at: snapshot.retrieved_at,
            transport: snapshot.transport.clone(),
            operation_count: snapshot.operations.len(),
        })
    }
}
