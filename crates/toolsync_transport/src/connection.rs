//! Connection seam between the pipeline and the wire.

use crate::http::HttpChannel;
use crate::jsonrpc::RpcConnection;
use crate::selector::TransportHandle;
use crate::stdio::StdioChannel;
use async_trait::async_trait;
use serde_json::Value;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Child process could not be started
    #[error("Failed to spawn {command}: {reason}")]
    Spawn {
        /// Executable
        command: String,
        /// OS error
        reason: String,
    },

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Malformed message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side answered with a JSON-RPC error
    #[error("Remote error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// The peer closed the connection
    #[error("Connection closed")]
    Closed,

    /// Timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),
}

impl TransportError {
    /// HTTP status, when the failure carries one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// An open, initialized connection to one service
#[async_trait]
pub trait ToolConnection: Send {
    /// List every operation, following pagination to the end
    async fn list_tools(&mut self) -> TransportResult<Vec<Value>>;

    /// Invoke one operation
    async fn call_tool(&mut self, name: &str, arguments: Value) -> TransportResult<Value>;

    /// Whether the connection is still structurally present
    fn is_open(&mut self) -> bool;

    /// Shut the connection down
    async fn close(&mut self) -> TransportResult<()>;
}

/// Opens connections from transport handles
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and complete the protocol handshake
    async fn connect(
        &self,
        service: &str,
        handle: &TransportHandle,
    ) -> TransportResult<Box<dyn ToolConnection>>;
}

/// Connector for the real stdio and HTTP transports
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(
        &self,
        service: &str,
        handle: &TransportHandle,
    ) -> TransportResult<Box<dyn ToolConnection>> {
        match handle {
            TransportHandle::Stdio { command, args, env } => {
                tracing::debug!(service = %service, command = %command, "spawning server process");
                let channel = StdioChannel::spawn(command, args, env)?;
                Ok(Box::new(RpcConnection::handshake(channel).await?))
            }
            TransportHandle::Http { url, headers } => {
                tracing::debug!(service = %service, "opening http session");
                let channel = HttpChannel::connect(url, headers)?;
                Ok(Box::new(RpcConnection::handshake(channel).await?))
            }
        }
    }
}
