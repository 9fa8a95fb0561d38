//! toolsync schema model
//!
//! Normalized operation definitions, the typed schema tree used by code
//! generation, introspection snapshots with their derived metadata, and the
//! diff engine that classifies changes between two snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod operation;
pub mod report;
pub mod schema;
pub mod snapshot;

pub use diff::{ChangeCounts, ChangeRecord, DiffEngine, DiffResult};
pub use operation::{OperationDefinition, OperationError};
pub use report::ChangeReport;
pub use schema::{Property, SchemaNode};
pub use snapshot::{IntrospectionSnapshot, SnapshotMetadata, TransportDescriptor};
