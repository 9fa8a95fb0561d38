//! Run options and unattended-context detection.

use toolsync_transport::EnvSource;

/// Variables whose presence marks an unattended (CI) run
const CI_MARKERS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
    "TF_BUILD",
    "CIRCLECI",
    "TRAVIS",
];

/// Whether the environment looks like a CI runner.
///
/// A marker set to an empty string, `false` or `0` does not count.
#[must_use]
pub fn detect_ci(env: &dyn EnvSource) -> bool {
    CI_MARKERS.iter().any(|name| {
        env.var(name).is_some_and(|value| {
            let value = value.trim().to_ascii_lowercase();
            !(value.is_empty() || value == "false" || value == "0")
        })
    })
}

/// What a run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Commit snapshots and regenerate sources
    Sync,
    /// Report drift only; write nothing
    Check,
}

/// Options for one orchestrator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Run mode
    pub mode: RunMode,
    /// Restrict the run to one service
    pub only: Option<String>,
    /// Accept breaking changes without asking
    pub assume_yes: bool,
    /// Skip services whose credential is missing
    pub skip_missing_auth: bool,
    /// Whether a human can be asked to confirm
    pub interactive: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Sync,
            only: None,
            assume_yes: false,
            skip_missing_auth: false,
            interactive: false,
        }
    }
}

impl RunOptions {
    /// Non-interactive sync of every service
    #[must_use]
    pub fn sync() -> Self {
        Self::default()
    }

    /// Read-only drift check of every service
    #[must_use]
    pub fn check() -> Self {
        Self {
            mode: RunMode::Check,
            ..Self::default()
        }
    }

    /// Restrict to one service
    #[must_use]
    pub fn with_only(mut self, name: impl Into<String>) -> Self {
        self.only = Some(name.into());
        self
    }

    /// Accept breaking changes without asking
    #[must_use]
    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// Skip services with missing credentials
    #[must_use]
    pub fn with_skip_missing_auth(mut self, skip: bool) -> Self {
        self.skip_missing_auth = skip;
        self
    }

    /// Allow confirmation prompts
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Apply unattended-context policy: CI implies skip-missing-auth and
    /// never prompts.
    #[must_use]
    pub fn with_ci(mut self, ci: bool) -> Self {
        if ci {
            self.skip_missing_auth = true;
            self.interactive = false;
        }
        self
    }

    /// Whether breaking changes must be confirmed before committing
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.mode == RunMode::Sync && self.interactive && !self.assume_yes
    }
}
