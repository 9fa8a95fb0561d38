//! Terminal confirmation for breaking changes.

use async_trait::async_trait;
use console::{Term, style};
use toolsync_sync::{ConfirmationPort, ConfirmationRequest};

/// Asks on stderr and reads the answer from the terminal
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    /// Prompt on the process's stderr terminal
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

/// Text shown before the question: every breaking change with its old
/// and new version markers.
pub fn render_request(request: &ConfirmationRequest) -> String {
    let mut out = format!(
        "{} breaking change(s) in {}:\n",
        request.changes.len(),
        request.services.join(", ")
    );
    for change in &request.changes {
        out.push_str(&format!("  - {}\n", change.describe()));
    }
    out
}

/// Only an explicit yes accepts
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl ConfirmationPort for TerminalPrompt {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let term = self.term.clone();
        let text = render_request(request);
        let answered = tokio::task::spawn_blocking(move || {
            term.write_str(&format!("{}", style(text).yellow()))?;
            term.write_str("Commit these changes? [y/N] ")?;
            term.read_line()
        })
        .await;

        match answered {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "could not read confirmation; treating as no");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt aborted; treating as no");
                false
            }
        }
    }
}
