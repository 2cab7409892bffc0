//! Intents: requests arriving from the host surface.
//!
//! Wire tags keep the surface protocol names; payload fields use the same
//! `snake_case` convention as the rest of the state messages.

use serde::Deserialize;

/// One request from the host surface.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Intent {
    /// The surface (re)connected and wants a full state replay.
    #[serde(rename = "ready")]
    Ready,
    /// Create a session from a prompt and start its plan run.
    #[serde(rename = "plan/new")]
    NewPlan {
        /// Prompt text, untrimmed.
        prompt: String,
    },
    /// Start the plan run of an existing session.
    #[serde(rename = "plan/run")]
    RunPlan {
        /// Which session.
        session_id: String,
    },
    /// Stop whichever run is active on a session.
    #[serde(rename = "plan/stop")]
    StopRun {
        /// Which session.
        session_id: String,
    },
    /// Start the implementation run.
    #[serde(rename = "plan/impl")]
    StartImplement {
        /// Which session.
        session_id: String,
        /// Overrides the session's linked issue when present.
        #[serde(default)]
        issue_number: Option<String>,
    },
    /// Start a refine run.
    #[serde(rename = "plan/refine")]
    StartRefine {
        /// Which session.
        session_id: String,
        /// Focus text for the refinement.
        focus: String,
        /// Run record identifier; generated when absent.
        #[serde(default)]
        run_id: Option<String>,
        /// Overrides the session's linked issue when present.
        #[serde(default)]
        issue_number: Option<String>,
    },
    /// Re-dispatch the most relevant previous run.
    #[serde(rename = "plan/rerun")]
    Rerun {
        /// Which session.
        session_id: String,
    },
    /// Flip the session card fold.
    #[serde(rename = "plan/toggleCollapse")]
    ToggleCollapse {
        /// Which session.
        session_id: String,
    },
    /// Flip the implementation section fold.
    #[serde(rename = "plan/toggleImplCollapse")]
    ToggleImplCollapse {
        /// Which session.
        session_id: String,
    },
    /// Flip one refine run's fold.
    #[serde(rename = "plan/toggleRefineCollapse")]
    ToggleRefineCollapse {
        /// Which session.
        session_id: String,
        /// Which refine run.
        run_id: String,
    },
    /// Delete a session, stopping its active run first.
    #[serde(rename = "plan/delete")]
    DeleteSession {
        /// Which session.
        session_id: String,
    },
    /// Persist the new-session draft prompt.
    #[serde(rename = "plan/updateDraft")]
    UpdateDraft {
        /// Current draft text.
        value: String,
    },
    /// Open the session's plan document in the host editor.
    #[serde(rename = "plan/view-plan")]
    ViewPlan {
        /// Which session.
        session_id: String,
    },
    /// Open the session's tracking issue in a browser.
    #[serde(rename = "plan/view-issue")]
    ViewIssue {
        /// Which session.
        session_id: String,
    },
    /// Open the session's pull request in a browser.
    #[serde(rename = "plan/view-pr")]
    ViewPr {
        /// Which session.
        session_id: String,
    },
    /// Open an arbitrary tracker URL after validation.
    #[serde(rename = "link/openExternal")]
    OpenExternal {
        /// URL from a rendered log line.
        url: String,
    },
    /// Open a local file referenced from a rendered log line.
    #[serde(rename = "link/openFile")]
    OpenFile {
        /// Raw path; may be relative or `~/`-prefixed.
        path: String,
    },
}
