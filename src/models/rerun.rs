//! Rerun directive model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::RunKind;

/// Snapshot of a failed run kept so it can be re-dispatched later.
///
/// Built when a run exits unsuccessfully and cleared down to a success
/// record (`last_exit_code == Some(0)`) when a later rerun of the same
/// target succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RerunDirective {
    /// Which kind of run to re-dispatch.
    pub kind: RunKind,
    /// Prompt or focus text to re-dispatch with, when the kind needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Issue number to re-dispatch against, when the kind needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<String>,
    /// Exit code of the most recent attempt at this target.
    ///
    /// `None` while a rerun is in flight, `Some(0)` once one succeeds,
    /// nonzero otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    /// When this directive was last rebuilt or updated.
    pub updated_at: DateTime<Utc>,
}

impl RerunDirective {
    /// Construct a directive for a failed run.
    #[must_use]
    pub fn new(
        kind: RunKind,
        prompt: Option<String>,
        issue_number: Option<String>,
        last_exit_code: Option<i32>,
    ) -> Self {
        Self {
            kind,
            prompt,
            issue_number,
            last_exit_code,
            updated_at: Utc::now(),
        }
    }
}
