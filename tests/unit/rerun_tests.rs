//! Rerun resolution tests: directive-first resolution, the status-based
//! fallback ladder, and the directive built after a failed exit.

use agent_workbench::models::refine::RefineRun;
use agent_workbench::models::rerun::RerunDirective;
use agent_workbench::models::run::RunKind;
use agent_workbench::models::session::{RunStatus, Session};
use agent_workbench::orchestrator::rerun::{
    build_rerun_from_failure, resolve_rerun_invocation, RerunInvocation,
};
use chrono::{DateTime, Utc};

fn session() -> Session {
    Session::new("add retry backoff to the sync worker")
}

fn stamp(rfc3339: &str) -> DateTime<Utc> {
    rfc3339.parse().expect("timestamp")
}

fn errored_run(id: &str, focus: &str, updated_at: &str) -> RefineRun {
    let mut run = RefineRun::with_id(id.to_owned(), focus);
    run.status = RunStatus::Error;
    run.updated_at = stamp(updated_at);
    run
}

// ── Directive-first resolution ───────────────────────

#[test]
fn refine_directive_resolves_with_its_own_payload() {
    let mut session = session();
    session.issue_number = Some("99".to_owned());
    session.rerun = Some(RerunDirective::new(
        RunKind::Refine,
        Some("  tighten error copy  ".to_owned()),
        Some(" 12 ".to_owned()),
        Some(1),
    ));
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Refine {
            prompt: "tighten error copy".to_owned(),
            issue: "12".to_owned(),
        })
    );
}

#[test]
fn refine_directive_falls_back_to_session_issue() {
    let mut session = session();
    session.issue_number = Some("34".to_owned());
    session.rerun = Some(RerunDirective::new(
        RunKind::Refine,
        Some("tighten error copy".to_owned()),
        None,
        Some(1),
    ));
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Refine {
            prompt: "tighten error copy".to_owned(),
            issue: "34".to_owned(),
        })
    );
}

#[test]
fn incomplete_refine_directive_resolves_to_nothing() {
    // The directive stays authoritative: a blank prompt or unusable issue
    // yields no invocation instead of falling back to run statuses.
    let mut session = session();
    session.status = RunStatus::Error;
    session.issue_number = Some("12".to_owned());
    session.rerun = Some(RerunDirective::new(RunKind::Refine, None, None, Some(1)));
    assert_eq!(resolve_rerun_invocation(&session), None);

    session.rerun = Some(RerunDirective::new(
        RunKind::Refine,
        Some("tighten error copy".to_owned()),
        Some("not-a-number".to_owned()),
        Some(1),
    ));
    assert_eq!(resolve_rerun_invocation(&session), None);
}

#[test]
fn implement_directive_prefers_its_issue_then_the_sessions() {
    let mut session = session();
    session.rerun = Some(RerunDirective::new(
        RunKind::Implement,
        None,
        Some("41".to_owned()),
        Some(2),
    ));
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Implement {
            issue: "41".to_owned()
        })
    );

    session.issue_number = Some("52".to_owned());
    session.rerun = Some(RerunDirective::new(RunKind::Implement, None, None, Some(2)));
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Implement {
            issue: "52".to_owned()
        })
    );

    session.issue_number = None;
    session.rerun = Some(RerunDirective::new(RunKind::Implement, None, None, Some(2)));
    assert_eq!(resolve_rerun_invocation(&session), None);
}

#[test]
fn plan_directive_always_resolves_to_a_plan() {
    let mut session = session();
    session.rerun = Some(RerunDirective::new(RunKind::Plan, None, None, Some(1)));
    assert_eq!(resolve_rerun_invocation(&session), Some(RerunInvocation::Plan));
    assert_eq!(
        resolve_rerun_invocation(&session).map(|invocation| invocation.kind()),
        Some(RunKind::Plan)
    );
}

// ── Status fallback ladder ───────────────────────────

#[test]
fn errored_implementation_reruns_as_implement() {
    let mut session = session();
    session.impl_status = RunStatus::Error;
    session.issue_number = Some("12".to_owned());
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Implement {
            issue: "12".to_owned()
        })
    );

    session.issue_number = None;
    assert_eq!(resolve_rerun_invocation(&session), None);
}

#[test]
fn latest_errored_refine_wins_the_fallback() {
    let mut session = session();
    session.issue_number = Some("12".to_owned());
    session
        .refine_runs
        .push(errored_run("run-1", "older focus", "2024-05-01T10:00:00Z"));
    session
        .refine_runs
        .push(errored_run("run-2", "newer focus", "2024-05-01T11:00:00Z"));
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Refine {
            prompt: "newer focus".to_owned(),
            issue: "12".to_owned(),
        })
    );

    session.issue_number = None;
    assert_eq!(resolve_rerun_invocation(&session), None);
}

#[test]
fn errored_plan_reruns_as_refine_once_an_issue_exists() {
    let mut session = session();
    session.status = RunStatus::Error;
    assert_eq!(resolve_rerun_invocation(&session), Some(RerunInvocation::Plan));

    session.issue_number = Some("12".to_owned());
    assert_eq!(
        resolve_rerun_invocation(&session),
        Some(RerunInvocation::Refine {
            prompt: session.prompt.clone(),
            issue: "12".to_owned(),
        })
    );
}

#[test]
fn settled_sessions_resolve_to_nothing() {
    let mut session = session();
    session.status = RunStatus::Success;
    session.impl_status = RunStatus::Success;
    session.issue_number = Some("12".to_owned());
    assert_eq!(resolve_rerun_invocation(&session), None);
}

// ── Directives built from failures ───────────────────

#[test]
fn implement_failure_records_the_session_issue() {
    let mut session = session();
    session.issue_number = Some("12".to_owned());
    let directive = build_rerun_from_failure(&session, RunKind::Implement, 3, None);
    assert_eq!(directive.kind, RunKind::Implement);
    assert_eq!(directive.prompt, None);
    assert_eq!(directive.issue_number.as_deref(), Some("12"));
    assert_eq!(directive.last_exit_code, Some(3));
}

#[test]
fn refine_failure_prefers_the_failed_runs_focus() {
    let mut session = session();
    session.issue_number = Some("12".to_owned());
    session
        .refine_runs
        .push(errored_run("run-1", "older focus", "2024-05-01T10:00:00Z"));
    session
        .refine_runs
        .push(errored_run("run-2", "newer focus", "2024-05-01T11:00:00Z"));

    let directive = build_rerun_from_failure(&session, RunKind::Refine, 1, Some("run-1"));
    assert_eq!(directive.prompt.as_deref(), Some("older focus"));

    // Without a matching run the newest active or errored focus is used.
    let directive = build_rerun_from_failure(&session, RunKind::Refine, 1, Some("run-9"));
    assert_eq!(directive.prompt.as_deref(), Some("newer focus"));
}

#[test]
fn refine_failure_without_runs_falls_back_to_the_prompt() {
    let session = session();
    let directive = build_rerun_from_failure(&session, RunKind::Refine, 1, None);
    assert_eq!(directive.prompt.as_deref(), Some(session.prompt.as_str()));
    assert_eq!(directive.issue_number, None);
}

#[test]
fn plan_failure_without_issue_reruns_the_plan() {
    let session = session();
    let directive = build_rerun_from_failure(&session, RunKind::Plan, 1, None);
    assert_eq!(directive.kind, RunKind::Plan);
    assert_eq!(directive.prompt.as_deref(), Some(session.prompt.as_str()));
    assert_eq!(directive.issue_number, None);
    assert_eq!(directive.last_exit_code, Some(1));
}

#[test]
fn plan_failure_with_issue_becomes_a_refine_directive() {
    let mut session = session();
    session.issue_number = Some(" 12 ".to_owned());
    let directive = build_rerun_from_failure(&session, RunKind::Plan, 1, None);
    assert_eq!(directive.kind, RunKind::Refine);
    assert_eq!(directive.prompt.as_deref(), Some(session.prompt.as_str()));
    assert_eq!(directive.issue_number.as_deref(), Some("12"));
}
