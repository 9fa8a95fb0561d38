//! toolsync sync orchestration
//!
//! Sequences credential resolution, introspection, diffing, confirmation,
//! commit and code generation across every configured service. A single
//! service's failure never aborts the run; only configuration faults do.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod confirm;
pub mod options;
pub mod orchestrator;
pub mod outcome;

pub use config::{ConfigError, PoolSettings, ToolsyncConfig};
pub use confirm::{AutoApprove, BreakingChange, ConfirmationPort, ConfirmationRequest, Deny};
pub use options::{RunMode, RunOptions, detect_ci};
pub use orchestrator::{SyncError, SyncOrchestrator};
pub use outcome::{ServiceOutcome, ServiceResult, SyncReport};
