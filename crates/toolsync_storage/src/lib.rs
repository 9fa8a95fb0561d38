//! toolsync storage
//!
//! Filesystem-backed snapshot store. Each service owns a directory holding the
//! latest committed snapshot, its metadata, an append-only history, and
//! markdown change reports.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod layout;
pub mod store;

pub use layout::ServiceLayout;
pub use store::{CommittedSnapshot, SnapshotStore, StoreError, StoreResult};
