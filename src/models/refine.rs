//! Refine run model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::RunStatus;

/// One focused follow-up pass recorded on a session.
///
/// A session keeps every refine run it ever started; the newest entries win
/// when the orchestrator needs "the" relevant run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RefineRun {
    /// Unique run identifier.
    pub id: String,
    /// Focus text the run was started with.
    pub focus: String,
    /// Lifecycle status of this run.
    #[serde(default)]
    pub status: RunStatus,
    /// Capped log lines for this run, oldest first.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Whether the run's log section is folded in the UI.
    #[serde(default)]
    pub collapsed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RefineRun {
    /// Construct an idle refine run with a generated identifier.
    #[must_use]
    pub fn new(focus: &str) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), focus)
    }

    /// Construct an idle refine run with a caller-supplied identifier.
    #[must_use]
    pub fn with_id(id: String, focus: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            focus: focus.to_owned(),
            status: RunStatus::Idle,
            logs: Vec::new(),
            collapsed: false,
            created_at: now,
            updated_at: now,
        }
    }
}
