//! Session model, derived attributes, and log-capping helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::refine::RefineRun;
use super::rerun::RerunDirective;
use super::widget::{Widget, WidgetKind, WidgetRole};

/// Every capped log sequence keeps only the newest lines up to this many.
pub const MAX_LOG_LINES: usize = 1000;

/// Current on-disk schema version for session records.
pub const SCHEMA_VERSION: u32 = 2;

/// Records missing a version field predate versioning and are treated as v1.
fn default_schema_version() -> u32 {
    1
}

/// Lifecycle status of a single run slot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Never started.
    #[default]
    Idle,
    /// A process is currently attached.
    Running,
    /// Finished with exit code zero.
    Success,
    /// Finished with a nonzero exit code or failed to start.
    Error,
}

impl RunStatus {
    /// Whether the run has finished, either way.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Whether a process is currently attached.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Last observed state of the session's tracking issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    /// The issue is open.
    Open,
    /// The issue is closed; implementation is blocked.
    Closed,
    /// The tracker could not be queried or gave an unrecognized answer.
    Unknown,
}

/// Coarse lifecycle phase, always derived from run statuses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// The plan run is active.
    Planning,
    /// The plan run finished and nothing else has started.
    PlanCompleted,
    /// A refine run is active.
    Refining,
    /// The implementation run is active.
    Implementing,
    /// The implementation run finished, either way.
    Completed,
}

/// Which user intent most recently drove the session.
///
/// Purely presentational: it selects action-row shapes and archived-row
/// captions, and resets to [`ActionMode::Default`] when runs settle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// No special intent in flight.
    #[default]
    Default,
    /// The user pressed Implement.
    Implement,
    /// The user pressed Refine.
    Refine,
    /// The user pressed Rerun.
    Rerun,
}

/// Derive the coarse phase from run statuses, in fixed priority order.
///
/// Implementation activity dominates, then refine activity, then the plan
/// run. The result is recomputed after every status change and never stored
/// independently of the statuses it reflects.
#[must_use]
pub fn derive_phase(plan: RunStatus, implementation: RunStatus, refine_runs: &[RefineRun]) -> Phase {
    if implementation.is_running() {
        return Phase::Implementing;
    }
    if implementation.is_terminal() {
        return Phase::Completed;
    }
    if refine_runs.iter().any(|run| run.status.is_running()) {
        return Phase::Refining;
    }
    if plan.is_running() {
        return Phase::Planning;
    }
    if plan.is_terminal() {
        return Phase::PlanCompleted;
    }
    Phase::Idle
}

/// Derive a list title from the prompt: whitespace collapsed, at most
/// twenty characters with an ellipsis, falling back to a placeholder.
#[must_use]
pub fn derive_title(prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return "New Plan".to_owned();
    }
    if normalized.chars().count() <= 20 {
        return normalized;
    }
    let head: String = normalized.chars().take(20).collect();
    format!("{head}...")
}

/// Discard the oldest overflow beyond [`MAX_LOG_LINES`].
pub fn trim_log(log: &mut Vec<String>) {
    if log.len() > MAX_LOG_LINES {
        let overflow = log.len() - MAX_LOG_LINES;
        log.drain(..overflow);
    }
}

/// One planning session and everything it has accumulated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// Derived list title.
    pub title: String,
    /// Original prompt the session was created with.
    pub prompt: String,
    /// Plan run status.
    #[serde(default)]
    pub status: RunStatus,
    /// Implementation run status.
    #[serde(default)]
    pub impl_status: RunStatus,
    /// Derived lifecycle phase.
    #[serde(default)]
    pub phase: Phase,
    /// Presentational intent marker.
    #[serde(default)]
    pub action_mode: ActionMode,
    /// Tracking issue number, as scanned or supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<String>,
    /// Last observed tracking-issue state; `None` until first checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_state: Option<IssueState>,
    /// Plan document path scanned from run output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    /// Pull request URL scanned from implementation output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Echo of the most recent plan command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Pending re-dispatch snapshot, if a run has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun: Option<RerunDirective>,
    /// Capped plan log lines, oldest first.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Capped implementation log lines, oldest first.
    #[serde(default)]
    pub impl_logs: Vec<String>,
    /// Every refine run ever started, oldest first.
    #[serde(default)]
    pub refine_runs: Vec<RefineRun>,
    /// Presentational artifacts, oldest first.
    #[serde(default)]
    pub widgets: Vec<Widget>,
    /// Widget receiving plan log lines when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_terminal_handle: Option<String>,
    /// Whether the session card is folded in the UI.
    #[serde(default)]
    pub collapsed: bool,
    /// Whether the implementation section is folded in the UI.
    #[serde(default)]
    pub impl_collapsed: bool,
    /// On-disk schema version; absent means v1.
    #[serde(default = "default_schema_version")]
    pub version: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Construct a fresh idle session for `prompt` with a generated
    /// identifier and derived title.
    #[must_use]
    pub fn new(prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: derive_title(prompt),
            prompt: prompt.to_owned(),
            status: RunStatus::Idle,
            impl_status: RunStatus::Idle,
            phase: Phase::Idle,
            action_mode: ActionMode::Default,
            issue_number: None,
            issue_state: None,
            plan_path: None,
            pr_url: None,
            command: None,
            rerun: None,
            logs: Vec::new(),
            impl_logs: Vec::new(),
            refine_runs: Vec::new(),
            widgets: Vec::new(),
            active_terminal_handle: None,
            collapsed: false,
            impl_collapsed: false,
            version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp the last-activity timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Recompute the derived phase from current statuses.
    #[must_use]
    pub fn derived_phase(&self) -> Phase {
        derive_phase(self.status, self.impl_status, &self.refine_runs)
    }

    /// Whether any refine run is currently marked running.
    #[must_use]
    pub fn has_running_refine(&self) -> bool {
        self.refine_runs.iter().any(|run| run.status.is_running())
    }

    /// Look up a refine run by identifier.
    pub fn refine_run(&self, run_id: &str) -> Option<&RefineRun> {
        self.refine_runs.iter().find(|run| run.id == run_id)
    }

    /// Look up a refine run by identifier, mutably.
    pub fn refine_run_mut(&mut self, run_id: &str) -> Option<&mut RefineRun> {
        self.refine_runs.iter_mut().find(|run| run.id == run_id)
    }

    /// Look up a widget by identifier.
    pub fn widget_by_id(&self, widget_id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|widget| widget.id == widget_id)
    }

    /// Look up a widget by identifier, mutably.
    pub fn widget_by_id_mut(&mut self, widget_id: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|widget| widget.id == widget_id)
    }

    /// Look up the first widget tagged with `role` and of the given kind.
    pub fn widget_by_role(&self, role: WidgetRole, kind: WidgetKind) -> Option<&Widget> {
        self.widgets
            .iter()
            .find(|widget| widget.role() == Some(role) && widget.kind() == kind)
    }

    /// Look up the first widget tagged with `role` and of the given kind,
    /// mutably.
    pub fn widget_by_role_mut(&mut self, role: WidgetRole, kind: WidgetKind) -> Option<&mut Widget> {
        self.widgets
            .iter_mut()
            .find(|widget| widget.role() == Some(role) && widget.kind() == kind)
    }

    /// Look up the widget tagged with `role` for a specific refine run.
    pub fn widget_for_run(
        &self,
        role: WidgetRole,
        run_id: &str,
        kind: WidgetKind,
    ) -> Option<&Widget> {
        self.widgets.iter().find(|widget| {
            widget.role() == Some(role)
                && widget.meta.run_id.as_deref() == Some(run_id)
                && widget.kind() == kind
        })
    }

    /// Look up the widget tagged with `role` for a specific refine run,
    /// mutably.
    pub fn widget_for_run_mut(
        &mut self,
        role: WidgetRole,
        run_id: &str,
        kind: WidgetKind,
    ) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|widget| {
            widget.role() == Some(role)
                && widget.meta.run_id.as_deref() == Some(run_id)
                && widget.kind() == kind
        })
    }
}
