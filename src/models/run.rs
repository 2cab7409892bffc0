//! Run kinds and the per-kind policy table.
//!
//! Every behavioral difference between plan, implement, and refine runs is
//! resolved through methods on [`RunKind`] so the orchestrator never branches
//! on string identifiers.

use serde::{Deserialize, Serialize};

use super::widget::WidgetRole;

/// The three kinds of external agent run a session can drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Produce a plan document and, typically, a tracking issue.
    Plan,
    /// Implement the planned work against the tracking issue.
    Implement,
    /// Apply a focused follow-up pass on top of a completed plan.
    Refine,
}

impl RunKind {
    /// Stable lowercase name, also the agent CLI subcommand.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Refine => "refine",
        }
    }

    /// Role tag for this kind's terminal log widget.
    #[must_use]
    pub fn terminal_role(self) -> WidgetRole {
        match self {
            Self::Plan => WidgetRole::PlanTerminal,
            Self::Implement => WidgetRole::ImplTerminal,
            Self::Refine => WidgetRole::RefineTerminal,
        }
    }

    /// Role tag for this kind's progress strip widget.
    #[must_use]
    pub fn progress_role(self) -> WidgetRole {
        match self {
            Self::Plan => WidgetRole::PlanProgress,
            Self::Implement => WidgetRole::ImplProgress,
            Self::Refine => WidgetRole::RefineProgress,
        }
    }

    /// Title given to the terminal widget when it is first created.
    #[must_use]
    pub fn terminal_title(self) -> &'static str {
        match self {
            Self::Plan => "Plan Console Log",
            Self::Implement => "Implementation Log",
            Self::Refine => "Refinement Log",
        }
    }

    /// Log line recorded when the executor refuses to launch this kind.
    #[must_use]
    pub fn launch_failure_line(self) -> &'static str {
        match self {
            Self::Plan | Self::Implement => "Unable to start session.",
            Self::Refine => "Unable to start refinement.",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
