//! Human-readable change reports.

use crate::diff::DiffResult;
use chrono::{DateTime, Utc};
use toolsync_core::Fingerprint;

/// Markdown report describing one diff between committed snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    /// Service name
    pub service_name: String,
    /// Fingerprint of the previously committed snapshot
    pub old_version: Option<Fingerprint>,
    /// Fingerprint of the new snapshot
    pub new_version: Fingerprint,
    /// When the new snapshot was retrieved
    pub retrieved_at: DateTime<Utc>,
    /// The classified changes
    pub diff: DiffResult,
}

impl ChangeReport {
    /// Render the report as markdown
    #[must_use]
    pub fn render(&self) -> String {
        let old = self
            .old_version
            .as_ref()
            .map_or_else(|| "none".to_string(), Fingerprint::short);
        let verdict = if self.diff.breaking {
            "**breaking**"
        } else {
            "non-breaking"
        };
        let counts = self.diff.counts();

        let mut out = format!("# Schema changes: {}\n\n", self.service_name);
        out.push_str(&format!("- Previous version: `{}`\n", old));
        out.push_str(&format!("- New version: `{}`\n", self.new_version.short()));
        out.push_str(&format!("- Retrieved at: {}\n", self.retrieved_at.to_rfc3339()));
        out.push_str(&format!("- Verdict: {}\n", verdict));
        out.push_str(&format!(
            "- Summary: {} added, {} removed, {} description, {} schema, {} output schema\n",
            counts.added, counts.removed, counts.description, counts.schema, counts.output
        ));
        out.push_str("\n## Changes\n\n");
        if self.diff.is_empty() {
            out.push_str("No changes.\n");
        }
        for change in &self.diff.changes {
            let marker = if change.is_breaking() { " (breaking)" } else { "" };
            out.push_str(&format!("- {}{}\n", change.describe(), marker));
        }
        out
    }
}
