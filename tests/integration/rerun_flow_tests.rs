//! Rerun bookkeeping through the engine: directives built from failed
//! exits, re-dispatch, and the frozen outcome row.

use agent_workbench::models::run::RunKind;
use agent_workbench::models::session::{ActionMode, Phase, RunStatus};
use agent_workbench::models::widget::{ActionId, WidgetBody, WidgetKind, WidgetRole};
use agent_workbench::orchestrator::intent::Intent;

use super::test_helpers::{planned_session, start, start_with, CannedTracker};

#[tokio::test]
async fn failed_plan_without_an_issue_reruns_as_a_plan() {
    let harness = start().await;
    harness
        .send(Intent::NewPlan {
            prompt: "wire up the importer".to_owned(),
        })
        .await;
    let created = harness.wait_for_created().await;

    harness.exec.emit_start(&created.id, "acw plan").await;
    harness.exec.emit_exit(&created.id, 1).await;

    let failed = harness
        .wait_for_session(&created.id, |session| session.status == RunStatus::Error)
        .await;
    assert_eq!(failed.phase, Phase::PlanCompleted);
    let directive = failed.rerun.as_ref().expect("directive recorded");
    assert_eq!(directive.kind, RunKind::Plan);
    assert_eq!(directive.prompt.as_deref(), Some("wire up the importer"));
    assert_eq!(directive.last_exit_code, Some(1));

    // Re-dispatch and let the retry succeed.
    harness
        .send(Intent::Rerun {
            session_id: created.id.clone(),
        })
        .await;
    let retrying = harness
        .wait_for_session(&created.id, |session| session.status.is_running())
        .await;
    assert_eq!(retrying.action_mode, ActionMode::Rerun);
    assert_eq!(harness.exec.requests().len(), 2);
    assert_eq!(harness.exec.requests()[1].kind, RunKind::Plan);

    harness.exec.emit_start(&created.id, "acw plan").await;
    harness.exec.emit_exit(&created.id, 0).await;

    let recovered = harness
        .wait_for_session(&created.id, |session| {
            session.status == RunStatus::Success
        })
        .await;
    assert_eq!(recovered.action_mode, ActionMode::Default);
    let directive = recovered.rerun.as_ref().expect("directive refreshed");
    assert_eq!(directive.last_exit_code, Some(0));

    let archived = recovered
        .widget_by_role(WidgetRole::SessionActionsArchived, WidgetKind::Buttons)
        .expect("archived rerun row");
    let WidgetBody::Buttons { buttons } = &archived.body else {
        panic!("expected button body");
    };
    assert_eq!(buttons.len(), 1);
    assert_eq!(buttons[0].id, ActionId::Reran);
    assert_eq!(buttons[0].label, "Reran");
    assert!(buttons[0].disabled);

    harness.stop().await;
}

#[tokio::test]
async fn failed_plan_with_an_issue_reruns_as_a_refinement() {
    let harness = start().await;
    harness
        .send(Intent::NewPlan {
            prompt: "wire up the importer".to_owned(),
        })
        .await;
    let created = harness.wait_for_created().await;

    harness.exec.emit_start(&created.id, "acw plan").await;
    harness
        .exec
        .emit_stdout(&created.id, "Created placeholder issue #42")
        .await;
    harness.exec.emit_exit(&created.id, 1).await;

    let failed = harness
        .wait_for_session(&created.id, |session| session.status == RunStatus::Error)
        .await;
    let directive = failed.rerun.as_ref().expect("directive recorded");
    assert_eq!(directive.kind, RunKind::Refine);
    assert_eq!(directive.prompt.as_deref(), Some("wire up the importer"));
    assert_eq!(directive.issue_number.as_deref(), Some("42"));

    harness.stop().await;
}

#[tokio::test]
async fn failed_implementation_reruns_against_its_issue() {
    let seed = planned_session("add exports to the report page", Some("42"));
    let session_id = seed.id.clone();
    let harness = start_with(CannedTracker::open(), vec![seed]).await;

    harness
        .send(Intent::StartImplement {
            session_id: session_id.clone(),
            issue_number: None,
        })
        .await;
    harness.exec.emit_start(&session_id, "acw implement --issue 42").await;
    harness.exec.emit_exit(&session_id, 1).await;

    let failed = harness
        .wait_for_session(&session_id, |session| {
            session.impl_status == RunStatus::Error
        })
        .await;
    let directive = failed.rerun.as_ref().expect("directive recorded");
    assert_eq!(directive.kind, RunKind::Implement);
    assert_eq!(directive.issue_number.as_deref(), Some("42"));
    assert_eq!(directive.last_exit_code, Some(1));

    let archived = failed
        .widget_by_role(WidgetRole::SessionActionsArchived, WidgetKind::Buttons)
        .expect("archived implement row");
    let WidgetBody::Buttons { buttons } = &archived.body else {
        panic!("expected button body");
    };
    assert_eq!(buttons[0].id, ActionId::Implemented);
    assert_eq!(buttons[0].label, "Implement failed");

    harness
        .send(Intent::Rerun {
            session_id: session_id.clone(),
        })
        .await;
    let retrying = harness
        .wait_for_session(&session_id, |session| session.impl_status.is_running())
        .await;
    assert_eq!(retrying.action_mode, ActionMode::Rerun);
    let request = harness.exec.requests().pop().expect("retry dispatched");
    assert_eq!(request.kind, RunKind::Implement);
    assert!(request.args.contains(&"42".to_owned()));

    harness.stop().await;
}

#[tokio::test]
async fn failed_refine_run_seeds_its_focus_into_the_directive() {
    let seed = planned_session("rework the cache layer", Some("42"));
    let session_id = seed.id.clone();
    let harness = start_with(CannedTracker::open(), vec![seed]).await;

    harness
        .send(Intent::StartRefine {
            session_id: session_id.clone(),
            focus: "add tests".to_owned(),
            run_id: Some("r1".to_owned()),
            issue_number: None,
        })
        .await;
    harness
        .exec
        .emit_start(&session_id, "acw refine --issue 42 --focus \"add tests\"")
        .await;
    harness.exec.emit_exit(&session_id, 1).await;

    let failed = harness
        .wait_for_session(&session_id, |session| {
            session
                .refine_run("r1")
                .is_some_and(|run| run.status == RunStatus::Error)
        })
        .await;
    let directive = failed.rerun.as_ref().expect("directive recorded");
    assert_eq!(directive.kind, RunKind::Refine);
    assert_eq!(directive.prompt.as_deref(), Some("add tests"));
    assert_eq!(directive.issue_number.as_deref(), Some("42"));

    // Rerunning creates a fresh refine run rather than reusing r1.
    harness
        .send(Intent::Rerun {
            session_id: session_id.clone(),
        })
        .await;
    let retrying = harness
        .wait_for_session(&session_id, |session| session.refine_runs.len() == 2)
        .await;
    let fresh = retrying
        .refine_runs
        .iter()
        .find(|run| run.id != "r1")
        .expect("fresh refine run");
    assert_eq!(fresh.focus, "add tests");

    harness.exec.emit_start(&session_id, "acw refine").await;
    harness.exec.emit_exit(&session_id, 1).await;

    // The refine failure froze one row already; the failed rerun freezes a
    // second one.
    let archived_rows = |session: &agent_workbench::models::session::Session| {
        session
            .widgets
            .iter()
            .filter(|widget| {
                widget.role() == Some(WidgetRole::SessionActionsArchived)
                    && widget.kind() == WidgetKind::Buttons
            })
            .cloned()
            .collect::<Vec<_>>()
    };
    let still_failed = harness
        .wait_for_session(&session_id, |session| archived_rows(session).len() == 2)
        .await;
    let newest = archived_rows(&still_failed).pop().expect("frozen rerun row");
    let WidgetBody::Buttons { buttons } = &newest.body else {
        panic!("expected button body");
    };
    assert_eq!(buttons[0].label, "Rerun failed");

    harness.stop().await;
}
