//! Per-service outcomes and the run summary.

use crate::options::RunMode;
use std::path::PathBuf;
use toolsync_core::Fingerprint;
use toolsync_schema::DiffResult;

/// Result of one service in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Introspected (and, in sync mode, committed)
    Succeeded,
    /// Attempted and failed
    Failed(String),
    /// Not attempted
    Skipped(String),
}

impl ServiceOutcome {
    /// Whether the service succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Everything recorded about one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResult {
    /// Service name
    pub service: String,
    /// Outcome
    pub outcome: ServiceOutcome,
    /// Fingerprint committed before this run
    pub previous: Option<Fingerprint>,
    /// Fingerprint observed in this run
    pub current: Option<Fingerprint>,
    /// Classified changes against the previous snapshot
    pub diff: Option<DiffResult>,
    /// Check mode: whether the live shape differs from the committed one
    pub drift: Option<bool>,
    /// Markdown change report written this run
    pub report_path: Option<PathBuf>,
}

impl ServiceResult {
    pub(crate) fn new(service: &str, outcome: ServiceOutcome) -> Self {
        Self {
            service: service.to_string(),
            outcome,
            previous: None,
            current: None,
            diff: None,
            drift: None,
            report_path: None,
        }
    }

    /// Whether an accepted diff contained breaking changes
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        self.diff.as_ref().is_some_and(|d| d.breaking)
    }
}

/// Aggregate result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Run mode
    pub mode: RunMode,
    /// Per-service results in run order
    pub results: Vec<ServiceResult>,
    /// A human rejected staged breaking changes
    pub rejected: bool,
    /// Shared outputs could not be written
    pub finalize_error: Option<String>,
}

impl SyncReport {
    pub(crate) fn new(mode: RunMode) -> Self {
        Self {
            mode,
            results: Vec::new(),
            rejected: false,
            finalize_error: None,
        }
    }

    /// Result for one service
    #[must_use]
    pub fn result(&self, service: &str) -> Option<&ServiceResult> {
        self.results.iter().find(|r| r.service == service)
    }

    fn count(&self, pred: impl Fn(&ServiceOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Number of succeeded services
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(ServiceOutcome::is_success)
    }

    /// Number of failed services
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ServiceOutcome::Failed(_)))
    }

    /// Number of skipped services
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ServiceOutcome::Skipped(_)))
    }

    /// Services whose live shape differs from the committed one
    #[must_use]
    pub fn drifted(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.drift == Some(true))
            .map(|r| r.service.as_str())
            .collect()
    }

    /// Process exit code.
    ///
    /// Non-zero when check mode finds drift, when a human rejected breaking
    /// changes, when shared outputs failed, or when nothing succeeded and
    /// at least one service failed. A run where everything was skipped
    /// exits 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let all_failed = self.succeeded() == 0 && self.failed() > 0;
        let drift = self.mode == RunMode::Check && !self.drifted().is_empty();
        if all_failed || drift || self.rejected || self.finalize_error.is_some() {
            1
        } else {
            0
        }
    }

    /// Human-readable summary
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let line = match &result.outcome {
                ServiceOutcome::Succeeded => match (self.mode, result.drift) {
                    (RunMode::Check, Some(true)) => format!(
                        "drift  {} ({} -> {})",
                        result.service,
                        short(result.previous.as_ref()),
                        short(result.current.as_ref())
                    ),
                    (RunMode::Check, _) => format!("ok     {} (in sync)", result.service),
                    (RunMode::Sync, _) => {
                        let changes = match &result.diff {
                            Some(diff) if diff.breaking => {
                                format!("{} changes, breaking", diff.changes.len())
                            }
                            Some(diff) if !diff.is_empty() => {
                                format!("{} changes", diff.changes.len())
                            }
                            _ => "unchanged".to_string(),
                        };
                        format!(
                            "ok     {} {} ({})",
                            result.service,
                            short(result.current.as_ref()),
                            changes
                        )
                    }
                },
                ServiceOutcome::Failed(reason) => format!("failed {}: {}", result.service, reason),
                ServiceOutcome::Skipped(reason) => format!("skip   {}: {}", result.service, reason),
            };
            out.push_str(&line);
            out.push('\n');
            if self.mode == RunMode::Sync
                && result.outcome.is_success()
                && let Some(diff) = result.diff.as_ref().filter(|d| d.breaking)
            {
                for change in diff.breaking_changes() {
                    out.push_str(&format!("         breaking: {}\n", change.describe()));
                }
            }
        }
        out.push_str(&format!(
            "{} succeeded, {} failed, {} skipped\n",
            self.succeeded(),
            self.failed(),
            self.skipped()
        ));
        if self.rejected {
            out.push_str("breaking changes were rejected; previous snapshots kept\n");
        }
        if let Some(error) = &self.finalize_error {
            out.push_str(&format!("failed to write shared outputs: {}\n", error));
        }
        out
    }
}

fn short(fingerprint: Option<&Fingerprint>) -> String {
    fingerprint.map_or_else(|| "none".to_string(), Fingerprint::short)
}
