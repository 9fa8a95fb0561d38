//! toolsync core types
//!
//! Pure types and logic with no network access.
//! Everything here is deterministic: the same input always yields the same
//! fingerprint, the same canonical bytes and the same slug.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod error;
pub mod hash;
pub mod slug;

// Re-exports
pub use canonical::{CanonicalConfig, Canonicalizer};
pub use error::{CoreError, CoreResult};
pub use hash::{Fingerprint, HashError};
pub use slug::ServiceSlug;
