//! toolsync transport layer
//!
//! Everything between a configured service and a live, listed connection:
//! - `config`: per-service transport and auth declarations
//! - `credential`: bearer credential resolution and auth-failure classification
//! - `selector`: policy checks and transport handle construction
//! - `connection`: the `ToolConnection`/`Connector` seam plus stdio and HTTP channels
//! - `pool`: at most one live connection per service
//! - `introspect`: the per-service introspection state machine
//! - `caller`: a thin typed calling convention over a pooled connection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caller;
pub mod config;
pub mod connection;
pub mod credential;
pub mod env;
pub mod http;
pub mod introspect;
pub mod jsonrpc;
pub mod pool;
pub mod selector;
pub mod stdio;

pub use caller::{CallError, ServiceCaller};
pub use config::{AuthConfig, ServerSpec, ServiceConfig, TransportConfig};
pub use connection::{
    Connector, DefaultConnector, ToolConnection, TransportError, TransportResult,
};
pub use credential::{CredentialResolution, CredentialResolver, is_authentication_failure};
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use introspect::{FailureKind, IntrospectError, IntrospectStage, Introspector};
pub use pool::{PoolConfig, PoolEntry, PoolError, PoolRegistry, PooledConnection};
pub use selector::{DEFAULT_ENV_ALLOWLIST, SelectError, TransportHandle, TransportSelector};
