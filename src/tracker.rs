//! Issue tracker queries via the `gh` CLI.

use std::future::Future;
use std::path::Path;

use tokio::process::Command;
use tracing::warn;

use crate::config::TrackerConfig;
use crate::models::session::IssueState;

/// Read-only tracker lookups for linked issues.
///
/// Lookups are best effort: failures degrade to [`IssueState::Unknown`] or
/// no URL rather than surfacing errors, since tracker state only annotates
/// sessions and never gates a run.
pub trait IssueTracker {
    /// Current open/closed state of an issue, queried from `cwd`.
    fn issue_state(
        &self,
        issue: &str,
        cwd: Option<&Path>,
    ) -> impl Future<Output = IssueState> + Send;

    /// Canonical web URL for an issue, queried from `cwd`.
    fn issue_url(
        &self,
        issue: &str,
        cwd: Option<&Path>,
    ) -> impl Future<Output = Option<String>> + Send;
}

/// [`IssueTracker`] backed by the GitHub CLI.
pub struct GhIssueTracker {
    program: String,
}

impl GhIssueTracker {
    /// Build a tracker from configuration.
    #[must_use]
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            program: config.program.clone(),
        }
    }

    /// Run `gh issue view` with one `--jq` projection and return trimmed stdout.
    async fn view_field(&self, issue: &str, field: &str, cwd: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["issue", "view", issue, "--json", field, "--jq", &format!(".{field}")])
            .current_dir(cwd)
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                warn!(issue, field, %err, "issue lookup failed to launch");
                return None;
            }
        };
        if !output.status.success() {
            warn!(issue, field, status = ?output.status.code(), "issue lookup failed");
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl IssueTracker for GhIssueTracker {
    fn issue_state(
        &self,
        issue: &str,
        cwd: Option<&Path>,
    ) -> impl Future<Output = IssueState> + Send {
        async move {
            let Some(cwd) = cwd else {
                return IssueState::Unknown;
            };
            match self.view_field(issue, "state", cwd).await {
                Some(state) => match state.to_ascii_lowercase().as_str() {
                    "closed" => IssueState::Closed,
                    "open" => IssueState::Open,
                    _ => IssueState::Unknown,
                },
                None => IssueState::Unknown,
            }
        }
    }

    fn issue_url(
        &self,
        issue: &str,
        cwd: Option<&Path>,
    ) -> impl Future<Output = Option<String>> + Send {
        async move {
            let cwd = cwd?;
            self.view_field(issue, "url", cwd).await
        }
    }
}
