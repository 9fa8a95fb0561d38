//! Breaking-change confirmation port.

use async_trait::async_trait;
use toolsync_core::Fingerprint;
use toolsync_schema::ChangeRecord;

/// One breaking change awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakingChange {
    /// Service name
    pub service: String,
    /// Committed fingerprint
    pub old_version: Option<Fingerprint>,
    /// Fingerprint that would be committed
    pub new_version: Fingerprint,
    /// The change
    pub change: ChangeRecord,
}

impl BreakingChange {
    /// One-line description naming both versions
    #[must_use]
    pub fn describe(&self) -> String {
        let old = self
            .old_version
            .as_ref()
            .map_or_else(|| "none".to_string(), Fingerprint::short);
        format!(
            "{}: {} ({} -> {})",
            self.service,
            self.change.describe(),
            old,
            self.new_version.short()
        )
    }
}

/// Everything a human needs to decide
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfirmationRequest {
    /// Services with staged breaking changes, in run order
    pub services: Vec<String>,
    /// Every breaking change across those services
    pub changes: Vec<BreakingChange>,
}

/// Asked once per run, after every service has been attempted
#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    /// `true` to commit the staged services, `false` to keep their previous snapshots
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPort for AutoApprove {
    async fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        true
    }
}

/// Rejects everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Deny;

#[async_trait]
impl ConfirmationPort for Deny {
    async fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_names_versions() {
        let change = BreakingChange {
            service: "github".to_string(),
            old_version: Some(Fingerprint::compute(b"a")),
            new_version: Fingerprint::compute(b"b"),
            change: ChangeRecord::OperationRemoved {
                name: "x".to_string(),
            },
        };
        let text = change.describe();
        assert!(text.starts_with("github: removed `x` ("));
        assert!(text.contains(&Fingerprint::compute(b"a").short()));
        assert!(text.contains(&Fingerprint::compute(b"b").short()));
    }
}
