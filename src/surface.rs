//! Action-row construction.
//!
//! The action row is rebuilt from scratch after every state change; buttons
//! carry no state of their own. While a user-selected action is in flight
//! the row collapses to that single disabled button, so the surface shows
//! exactly one "running" affordance.

use crate::models::session::{ActionMode, IssueState, Phase, RunStatus, Session};
use crate::models::widget::{ActionButton, ActionId, ButtonVariant};

fn button(id: ActionId, label: &str, variant: ButtonVariant, disabled: bool) -> ActionButton {
    ActionButton {
        id,
        label: label.to_owned(),
        variant,
        disabled,
    }
}

/// Build the live action row for a session's current state.
///
/// `has_rerun_target` reports whether rerun resolution found something to
/// re-dispatch; the rerun button is inert without one.
#[must_use]
pub fn build_action_buttons(session: &Session, has_rerun_target: bool) -> Vec<ActionButton> {
    let has_plan_path = session
        .plan_path
        .as_deref()
        .is_some_and(|path| !path.trim().is_empty());
    let has_issue_number = session
        .issue_number
        .as_deref()
        .is_some_and(|issue| !issue.trim().is_empty());
    let plan_done = session.status.is_terminal();
    let plan_success = session.status == RunStatus::Success;
    let impl_running = session.impl_status.is_running();
    let impl_success = session.impl_status == RunStatus::Success;
    let impl_error = session.impl_status == RunStatus::Error;
    let issue_closed = session.issue_state == Some(IssueState::Closed);
    let is_planning = session.phase == Phase::Planning;
    let is_refining = session.phase == Phase::Refining;
    let is_implementing = session.phase == Phase::Implementing;
    let is_busy = is_planning || is_refining || is_implementing;
    let rerun_exit = session.rerun.as_ref().and_then(|rerun| rerun.last_exit_code);

    // While a selected action is running, keep only that action visible.
    if is_busy && session.action_mode == ActionMode::Rerun {
        return vec![button(
            ActionId::Rerun,
            "Rerunning...",
            ButtonVariant::Primary,
            true,
        )];
    }
    if is_busy && session.action_mode == ActionMode::Refine {
        return vec![button(
            ActionId::Refine,
            "Running...",
            ButtonVariant::Secondary,
            true,
        )];
    }
    if is_busy && session.action_mode == ActionMode::Implement {
        return vec![button(
            ActionId::Implement,
            "Running...",
            ButtonVariant::Primary,
            true,
        )];
    }

    // Idle and completed states always render the full action row.
    let mut buttons = vec![
        button(
            ActionId::ViewPlan,
            "View Plan",
            ButtonVariant::Secondary,
            !has_plan_path || !plan_done,
        ),
        button(
            ActionId::ViewIssue,
            "View Issue",
            ButtonVariant::Secondary,
            !has_issue_number,
        ),
    ];

    let impl_label = if impl_running {
        "Running..."
    } else if impl_error {
        "Re-implement"
    } else if issue_closed {
        "Closed"
    } else {
        "Implement"
    };
    let impl_disabled =
        !plan_success || issue_closed || is_planning || is_refining || impl_running;
    buttons.push(button(
        ActionId::Implement,
        impl_label,
        ButtonVariant::Primary,
        impl_disabled,
    ));

    buttons.push(button(
        ActionId::Refine,
        "Refine",
        ButtonVariant::Secondary,
        !plan_done || is_planning || is_implementing || is_refining,
    ));

    buttons.push(button(
        ActionId::Rerun,
        "Rerun",
        ButtonVariant::Secondary,
        is_busy || rerun_exit == Some(0) || !has_rerun_target,
    ));

    if impl_success && session.pr_url.is_some() {
        buttons.push(button(
            ActionId::ViewPr,
            "View PR",
            ButtonVariant::Primary,
            false,
        ));
    }

    buttons
}

/// Frozen marker for an archived rerun row.
#[must_use]
pub fn reran_marker(success: bool) -> ActionButton {
    button(
        ActionId::Reran,
        if success { "Reran" } else { "Rerun failed" },
        ButtonVariant::Secondary,
        true,
    )
}

/// Frozen marker for an archived refine row.
#[must_use]
pub fn refined_marker(success: bool) -> ActionButton {
    button(
        ActionId::Refined,
        if success { "Refined" } else { "Refine failed" },
        ButtonVariant::Secondary,
        true,
    )
}

/// Frozen marker for an archived implementation row.
#[must_use]
pub fn implemented_marker(success: bool) -> ActionButton {
    button(
        ActionId::Implemented,
        if success { "Implemented" } else { "Implement failed" },
        ButtonVariant::Primary,
        true,
    )
}
