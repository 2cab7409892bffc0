//! Rerun target resolution.
//!
//! A rerun request re-dispatches the most relevant previous run. The
//! explicit directive left behind by the last failure wins; without one the
//! session's run statuses are inspected from the most specific slot down
//! (implementation, then refine runs, then the plan itself).

use crate::classify::is_issue_reference;
use crate::models::refine::RefineRun;
use crate::models::rerun::RerunDirective;
use crate::models::run::RunKind;
use crate::models::session::{RunStatus, Session};

/// Concrete invocation a rerun request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerunInvocation {
    /// Re-dispatch the plan run.
    Plan,
    /// Re-dispatch the implementation run against `issue`.
    Implement {
        /// Issue number, trimmed.
        issue: String,
    },
    /// Re-dispatch a refinement of `prompt` against `issue`.
    Refine {
        /// Focus text for the refinement.
        prompt: String,
        /// Issue number, trimmed.
        issue: String,
    },
}

impl RerunInvocation {
    /// Which run slot this invocation dispatches into.
    #[must_use]
    pub fn kind(&self) -> RunKind {
        match self {
            Self::Plan => RunKind::Plan,
            Self::Implement { .. } => RunKind::Implement,
            Self::Refine { .. } => RunKind::Refine,
        }
    }
}

/// Resolve what a rerun request on `session` would dispatch, if anything.
///
/// An existing directive is authoritative, even when its payload turns out
/// incomplete; only a session without one falls back to inspecting run
/// statuses.
pub fn resolve_rerun_invocation(session: &Session) -> Option<RerunInvocation> {
    if let Some(directive) = &session.rerun {
        return match directive.kind {
            RunKind::Refine => {
                let prompt = directive.prompt.as_deref().unwrap_or_default().trim();
                let issue = directive
                    .issue_number
                    .as_deref()
                    .or(session.issue_number.as_deref())
                    .unwrap_or_default()
                    .trim();
                if prompt.is_empty() || !is_issue_reference(issue) {
                    return None;
                }
                Some(RerunInvocation::Refine {
                    prompt: prompt.to_owned(),
                    issue: issue.to_owned(),
                })
            }
            RunKind::Implement => {
                let issue = directive
                    .issue_number
                    .as_deref()
                    .or(session.issue_number.as_deref())
                    .unwrap_or_default()
                    .trim();
                if issue.is_empty() {
                    return None;
                }
                Some(RerunInvocation::Implement {
                    issue: issue.to_owned(),
                })
            }
            RunKind::Plan => Some(RerunInvocation::Plan),
        };
    }

    let session_issue = session.issue_number.as_deref().unwrap_or_default().trim();

    if session.impl_status == RunStatus::Error {
        if session_issue.is_empty() {
            return None;
        }
        return Some(RerunInvocation::Implement {
            issue: session_issue.to_owned(),
        });
    }

    if let Some(run) = latest_errored_refine(&session.refine_runs) {
        if session_issue.is_empty() {
            return None;
        }
        return Some(RerunInvocation::Refine {
            prompt: run.focus.clone(),
            issue: session_issue.to_owned(),
        });
    }

    if session.status == RunStatus::Error {
        if session_issue.is_empty() {
            return Some(RerunInvocation::Plan);
        }
        return Some(RerunInvocation::Refine {
            prompt: session.prompt.clone(),
            issue: session_issue.to_owned(),
        });
    }

    None
}

/// Build the directive recorded when a run of `kind` exits nonzero.
///
/// `session` is the record as it stood before the exit was folded in;
/// `run_id` names the refine run when the failure came from one.
#[must_use]
pub fn build_rerun_from_failure(
    session: &Session,
    kind: RunKind,
    exit_code: i32,
    run_id: Option<&str>,
) -> RerunDirective {
    match kind {
        RunKind::Implement => RerunDirective::new(
            RunKind::Implement,
            None,
            session.issue_number.clone(),
            Some(exit_code),
        ),
        RunKind::Refine => {
            let prompt = run_id
                .and_then(|run_id| session.refine_run(run_id))
                .map(|run| run.focus.clone())
                .or_else(|| latest_active_or_errored_refine(&session.refine_runs))
                .unwrap_or_else(|| session.prompt.clone());
            RerunDirective::new(
                RunKind::Refine,
                Some(prompt),
                session.issue_number.clone(),
                Some(exit_code),
            )
        }
        RunKind::Plan => {
            let issue = session.issue_number.as_deref().unwrap_or_default().trim();
            if issue.is_empty() {
                RerunDirective::new(
                    RunKind::Plan,
                    Some(session.prompt.clone()),
                    None,
                    Some(exit_code),
                )
            } else {
                // A failed plan that already produced an issue reruns as a
                // refinement of that issue rather than a fresh plan.
                RerunDirective::new(
                    RunKind::Refine,
                    Some(session.prompt.clone()),
                    Some(issue.to_owned()),
                    Some(exit_code),
                )
            }
        }
    }
}

/// The most recently updated refine run that ended in error.
fn latest_errored_refine(runs: &[RefineRun]) -> Option<&RefineRun> {
    runs.iter()
        .filter(|run| run.status == RunStatus::Error)
        .max_by_key(|run| run.updated_at)
}

/// Focus of the most recently updated refine run that errored or is still
/// running, used when a refine failure cannot be tied to a specific run.
fn latest_active_or_errored_refine(runs: &[RefineRun]) -> Option<String> {
    runs.iter()
        .filter(|run| matches!(run.status, RunStatus::Error | RunStatus::Running))
        .max_by_key(|run| run.updated_at)
        .map(|run| run.focus.clone())
}
