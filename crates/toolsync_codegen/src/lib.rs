//! toolsync code generator
//!
//! Turns a committed snapshot into TypeScript: one file per operation holding
//! its input (and output) types plus a wrapper that forwards to `callTool`, a
//! per-service index, a global catalog and a top-level index. Output is a pure
//! function of the snapshot; there are no timestamps in generated files.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod emit;
pub mod ident;
pub mod typescript;
pub mod writer;

pub use catalog::{Catalog, CatalogEntry};
pub use emit::{GeneratedFile, ServiceArtifacts, generate_service};
pub use ident::IdentifierAllocator;
pub use writer::{ArtifactWriter, CodegenError, CodegenResult};
