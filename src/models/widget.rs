//! Widget model: presentational artifacts a session accumulates as runs
//! execute.
//!
//! Widgets are owned by the session record and survive restarts; the UI only
//! ever receives copies. Content is typed per widget kind rather than stuffed
//! into an untyped metadata bag, so the store can enforce caps and the
//! orchestrator can post precise deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress widgets keep only the newest markers up to this many entries.
pub const MAX_PROGRESS_EVENTS: usize = 200;

/// Discard the oldest overflow beyond [`MAX_PROGRESS_EVENTS`].
pub fn trim_events(events: &mut Vec<ProgressEvent>) {
    if events.len() > MAX_PROGRESS_EVENTS {
        let overflow = events.len() - MAX_PROGRESS_EVENTS;
        events.drain(..overflow);
    }
}

/// Role tag locating a widget within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetRole {
    /// Terminal log for the plan run.
    PlanTerminal,
    /// Stage strip for the plan run.
    PlanProgress,
    /// Terminal log for the implementation run.
    ImplTerminal,
    /// Stage strip for the implementation run.
    ImplProgress,
    /// Terminal log for a refine run.
    RefineTerminal,
    /// Stage strip for a refine run.
    RefineProgress,
    /// The live action-button row.
    SessionActions,
    /// A frozen action-button row kept as a historical record.
    SessionActionsArchived,
}

/// Marker accumulated by a progress widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A recognized stage announcement scanned from agent stderr.
    Stage {
        /// The matched stage line, verbatim.
        label: String,
        /// When the line was observed.
        at: DateTime<Utc>,
    },
    /// Terminal marker recorded when the run exits.
    Exit {
        /// When the run exited.
        at: DateTime<Utc>,
    },
}

/// Identifier of an action a button can request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionId {
    /// Open the plan document.
    ViewPlan,
    /// Open the tracking issue in a browser.
    ViewIssue,
    /// Start the implementation run.
    Implement,
    /// Start a refine run.
    Refine,
    /// Re-dispatch the most relevant failed run.
    Rerun,
    /// Open the pull request in a browser.
    ViewPr,
    /// Archived marker: a rerun finished.
    Reran,
    /// Archived marker: a refine pass finished.
    Refined,
    /// Archived marker: implementation finished.
    Implemented,
}

/// Visual weight of an action button.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ButtonVariant {
    /// Emphasized call to action.
    Primary,
    /// Regular weight.
    Secondary,
}

/// One button in an action row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ActionButton {
    /// Action requested when pressed.
    pub id: ActionId,
    /// Visible caption.
    pub label: String,
    /// Visual weight.
    pub variant: ButtonVariant,
    /// Whether the button is currently inert.
    pub disabled: bool,
}

/// Lookup and linkage metadata attached to a widget.
///
/// All fields are optional; [`WidgetMeta::merge`] applies a patch shallowly,
/// so an update touching one field leaves the rest intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WidgetMeta {
    /// Role tag used for widget lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<WidgetRole>,
    /// Owning refine run, for per-run widgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Identifier of the terminal widget a progress strip belongs with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,
    /// Focus text a refine run was started with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Set when an action row is frozen into a historical record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl WidgetMeta {
    /// Tag with a role only.
    #[must_use]
    pub fn for_role(role: WidgetRole) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    /// Tag with a role and owning refine run.
    #[must_use]
    pub fn for_run(role: WidgetRole, run_id: &str) -> Self {
        Self {
            role: Some(role),
            run_id: Some(run_id.to_owned()),
            ..Self::default()
        }
    }

    /// Apply `patch` shallowly: set fields overwrite, unset fields keep.
    pub fn merge(&mut self, patch: Self) {
        if patch.role.is_some() {
            self.role = patch.role;
        }
        if patch.run_id.is_some() {
            self.run_id = patch.run_id;
        }
        if patch.terminal_id.is_some() {
            self.terminal_id = patch.terminal_id;
        }
        if patch.focus.is_some() {
            self.focus = patch.focus;
        }
        if patch.archived_at.is_some() {
            self.archived_at = patch.archived_at;
        }
    }
}

/// Discriminates widget content without inspecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Append-only line log.
    Terminal,
    /// Ordered stage/exit markers.
    Progress,
    /// Action-button row.
    Buttons,
}

/// Typed widget content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WidgetBody {
    /// Append-only log, capped like the session log sequences.
    Terminal {
        /// Accumulated lines, oldest first.
        lines: Vec<String>,
    },
    /// Ordered markers, capped at [`MAX_PROGRESS_EVENTS`].
    Progress {
        /// Accumulated markers, oldest first.
        events: Vec<ProgressEvent>,
    },
    /// Snapshot of an action-button row.
    Buttons {
        /// Current buttons, in display order.
        buttons: Vec<ActionButton>,
    },
}

/// A presentational artifact owned by a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Widget {
    /// Unique widget identifier.
    pub id: String,
    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Typed content.
    #[serde(flatten)]
    pub body: WidgetBody,
    /// Lookup and linkage metadata.
    #[serde(default)]
    pub meta: WidgetMeta,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Widget {
    /// Construct an empty terminal widget.
    #[must_use]
    pub fn terminal(title: &str, meta: WidgetMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: Some(title.to_owned()),
            body: WidgetBody::Terminal { lines: Vec::new() },
            meta,
            created_at: Utc::now(),
        }
    }

    /// Construct an empty progress widget.
    #[must_use]
    pub fn progress(meta: WidgetMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            body: WidgetBody::Progress { events: Vec::new() },
            meta,
            created_at: Utc::now(),
        }
    }

    /// Construct a button-row widget with an initial button set.
    #[must_use]
    pub fn buttons(buttons: Vec<ActionButton>, meta: WidgetMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            body: WidgetBody::Buttons { buttons },
            meta,
            created_at: Utc::now(),
        }
    }

    /// Content discriminant.
    #[must_use]
    pub fn kind(&self) -> WidgetKind {
        match self.body {
            WidgetBody::Terminal { .. } => WidgetKind::Terminal,
            WidgetBody::Progress { .. } => WidgetKind::Progress,
            WidgetBody::Buttons { .. } => WidgetKind::Buttons,
        }
    }

    /// Role tag, if any.
    pub fn role(&self) -> Option<WidgetRole> {
        self.meta.role
    }
}
