//! Domain model tests: phase derivation, title derivation, log caps, and
//! the serde shapes the surface protocol depends on.

use agent_workbench::models::refine::RefineRun;
use agent_workbench::models::run::RunKind;
use agent_workbench::models::session::{
    derive_phase, derive_title, trim_log, ActionMode, Phase, RunStatus, Session,
    MAX_LOG_LINES, SCHEMA_VERSION,
};
use agent_workbench::models::widget::{
    ActionId, ProgressEvent, Widget, WidgetBody, WidgetKind, WidgetMeta, WidgetRole,
};
use chrono::Utc;

fn refine_with_status(status: RunStatus) -> RefineRun {
    let mut run = RefineRun::new("tighten error copy");
    run.status = status;
    run
}

// ── Phase derivation ─────────────────────────────────

#[test]
fn implementation_activity_dominates_phase() {
    let refining = [refine_with_status(RunStatus::Running)];
    let phase = derive_phase(RunStatus::Running, RunStatus::Running, &refining);
    assert_eq!(phase, Phase::Implementing);
}

#[test]
fn terminal_implementation_reports_completed() {
    let refining = [refine_with_status(RunStatus::Running)];
    assert_eq!(
        derive_phase(RunStatus::Success, RunStatus::Success, &refining),
        Phase::Completed
    );
    assert_eq!(
        derive_phase(RunStatus::Success, RunStatus::Error, &[]),
        Phase::Completed
    );
}

#[test]
fn running_refine_beats_plan_status() {
    let refining = [
        refine_with_status(RunStatus::Error),
        refine_with_status(RunStatus::Running),
    ];
    assert_eq!(
        derive_phase(RunStatus::Running, RunStatus::Idle, &refining),
        Phase::Refining
    );
}

#[test]
fn plan_status_drives_remaining_phases() {
    let settled = [refine_with_status(RunStatus::Error)];
    assert_eq!(
        derive_phase(RunStatus::Running, RunStatus::Idle, &[]),
        Phase::Planning
    );
    assert_eq!(
        derive_phase(RunStatus::Success, RunStatus::Idle, &settled),
        Phase::PlanCompleted
    );
    assert_eq!(
        derive_phase(RunStatus::Error, RunStatus::Idle, &[]),
        Phase::PlanCompleted
    );
    assert_eq!(
        derive_phase(RunStatus::Idle, RunStatus::Idle, &[]),
        Phase::Idle
    );
}

#[test]
fn derived_phase_reads_session_fields() {
    let mut session = Session::new("add retry backoff");
    session.status = RunStatus::Success;
    assert_eq!(session.derived_phase(), Phase::PlanCompleted);
    session.refine_runs.push(refine_with_status(RunStatus::Running));
    assert_eq!(session.derived_phase(), Phase::Refining);
    assert!(session.has_running_refine());
}

// ── Title derivation ─────────────────────────────────

#[test]
fn title_collapses_whitespace() {
    assert_eq!(derive_title("  add   retry\n backoff "), "add retry backoff");
}

#[test]
fn blank_prompt_falls_back_to_placeholder() {
    assert_eq!(derive_title(""), "New Plan");
    assert_eq!(derive_title("   \n\t "), "New Plan");
}

#[test]
fn twenty_character_title_passes_unchanged() {
    let prompt = "a".repeat(20);
    assert_eq!(derive_title(&prompt), prompt);
}

#[test]
fn long_title_truncates_with_ellipsis() {
    let prompt = "b".repeat(21);
    let title = derive_title(&prompt);
    assert_eq!(title, format!("{}...", "b".repeat(20)));
}

#[test]
fn truncation_counts_characters_not_bytes() {
    let prompt = "é".repeat(25);
    let title = derive_title(&prompt);
    assert_eq!(title.chars().count(), 23);
    assert!(title.ends_with("..."));
}

// ── Log caps ─────────────────────────────────────────

#[test]
fn trim_log_drops_oldest_overflow() {
    let mut log: Vec<String> = (0..MAX_LOG_LINES + 5).map(|n| format!("line {n}")).collect();
    trim_log(&mut log);
    assert_eq!(log.len(), MAX_LOG_LINES);
    assert_eq!(log[0], "line 5");
}

#[test]
fn trim_log_leaves_a_full_log_alone() {
    let mut log: Vec<String> = (0..MAX_LOG_LINES).map(|n| format!("line {n}")).collect();
    trim_log(&mut log);
    assert_eq!(log.len(), MAX_LOG_LINES);
    assert_eq!(log[0], "line 0");
}

// ── Run status and kind policy ───────────────────────

#[test]
fn run_status_predicates() {
    assert!(RunStatus::Success.is_terminal());
    assert!(RunStatus::Error.is_terminal());
    assert!(!RunStatus::Idle.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Running.is_running());
    assert!(!RunStatus::Success.is_running());
}

#[test]
fn run_kind_maps_to_subcommand_and_titles() {
    assert_eq!(RunKind::Plan.as_str(), "plan");
    assert_eq!(RunKind::Implement.as_str(), "implement");
    assert_eq!(RunKind::Refine.as_str(), "refine");
    assert_eq!(RunKind::Plan.to_string(), "plan");
    assert_eq!(RunKind::Plan.terminal_title(), "Plan Console Log");
    assert_eq!(RunKind::Implement.terminal_title(), "Implementation Log");
    assert_eq!(RunKind::Refine.terminal_title(), "Refinement Log");
}

#[test]
fn run_kind_maps_to_widget_roles() {
    assert_eq!(RunKind::Plan.terminal_role(), WidgetRole::PlanTerminal);
    assert_eq!(RunKind::Plan.progress_role(), WidgetRole::PlanProgress);
    assert_eq!(RunKind::Implement.terminal_role(), WidgetRole::ImplTerminal);
    assert_eq!(RunKind::Implement.progress_role(), WidgetRole::ImplProgress);
    assert_eq!(RunKind::Refine.terminal_role(), WidgetRole::RefineTerminal);
    assert_eq!(RunKind::Refine.progress_role(), WidgetRole::RefineProgress);
}

#[test]
fn launch_failure_lines_differ_for_refine() {
    assert_eq!(RunKind::Plan.launch_failure_line(), "Unable to start session.");
    assert_eq!(
        RunKind::Implement.launch_failure_line(),
        "Unable to start session."
    );
    assert_eq!(
        RunKind::Refine.launch_failure_line(),
        "Unable to start refinement."
    );
}

// ── Serde shapes ─────────────────────────────────────

#[test]
fn phase_serializes_kebab_case() {
    let values = [
        (Phase::Idle, "\"idle\""),
        (Phase::Planning, "\"planning\""),
        (Phase::PlanCompleted, "\"plan-completed\""),
        (Phase::Refining, "\"refining\""),
        (Phase::Implementing, "\"implementing\""),
        (Phase::Completed, "\"completed\""),
    ];
    for (variant, expected) in values {
        let json = serde_json::to_string(&variant).expect("serialize phase");
        assert_eq!(json, expected, "Phase::{variant:?}");
        let back: Phase = serde_json::from_str(&json).expect("deserialize phase");
        assert_eq!(back, variant);
    }
}

#[test]
fn statuses_and_modes_serialize_snake_case() {
    assert_eq!(
        serde_json::to_string(&RunStatus::Running).expect("status"),
        "\"running\""
    );
    assert_eq!(
        serde_json::to_string(&ActionMode::Default).expect("mode"),
        "\"default\""
    );
    assert_eq!(
        serde_json::to_string(&RunKind::Implement).expect("kind"),
        "\"implement\""
    );
}

#[test]
fn action_ids_and_roles_serialize_kebab_case() {
    assert_eq!(
        serde_json::to_string(&ActionId::ViewPlan).expect("action id"),
        "\"view-plan\""
    );
    assert_eq!(
        serde_json::to_string(&ActionId::ViewPr).expect("action id"),
        "\"view-pr\""
    );
    assert_eq!(
        serde_json::to_string(&WidgetRole::ImplTerminal).expect("role"),
        "\"impl-terminal\""
    );
    assert_eq!(
        serde_json::to_string(&WidgetRole::SessionActionsArchived).expect("role"),
        "\"session-actions-archived\""
    );
}

#[test]
fn progress_events_tag_their_kind() {
    let at = Utc::now();
    let stage = serde_json::to_value(ProgressEvent::Stage {
        label: "Stage 1/5: Running plan (claude)".to_owned(),
        at,
    })
    .expect("stage value");
    assert_eq!(stage["kind"], "stage");
    assert_eq!(stage["label"], "Stage 1/5: Running plan (claude)");

    let exit = serde_json::to_value(ProgressEvent::Exit { at }).expect("exit value");
    assert_eq!(exit["kind"], "exit");
}

#[test]
fn widget_body_flattens_into_the_widget_object() {
    let widget = Widget::terminal(
        "Plan Console Log",
        WidgetMeta::for_role(WidgetRole::PlanTerminal),
    );
    let value = serde_json::to_value(&widget).expect("widget value");
    assert_eq!(value["kind"], "terminal");
    assert_eq!(value["title"], "Plan Console Log");
    assert!(value["lines"].as_array().expect("lines array").is_empty());
    assert_eq!(value["meta"]["role"], "plan-terminal");

    let back: Widget = serde_json::from_value(value).expect("widget round trip");
    assert_eq!(back, widget);
    assert_eq!(back.kind(), WidgetKind::Terminal);
    assert_eq!(back.role(), Some(WidgetRole::PlanTerminal));
}

#[test]
fn fresh_session_omits_unset_optional_fields() {
    let session = Session::new("add retry backoff");
    let value = serde_json::to_value(&session).expect("session value");
    assert_eq!(value["version"], SCHEMA_VERSION);
    for absent in [
        "issue_number",
        "issue_state",
        "plan_path",
        "pr_url",
        "command",
        "rerun",
        "active_terminal_handle",
    ] {
        assert!(value.get(absent).is_none(), "unexpected field {absent}");
    }
}

#[test]
fn minimal_record_deserializes_with_v1_defaults() {
    let raw = serde_json::json!({
        "id": "legacy-1",
        "title": "Legacy",
        "prompt": "legacy prompt",
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:05:00Z",
    });
    let session: Session = serde_json::from_value(raw).expect("minimal record");
    assert_eq!(session.version, 1);
    assert_eq!(session.status, RunStatus::Idle);
    assert_eq!(session.phase, Phase::Idle);
    assert_eq!(session.action_mode, ActionMode::Default);
    assert!(session.logs.is_empty());
    assert!(session.widgets.is_empty());
    assert!(!session.collapsed);
}

// ── Widget metadata and lookups ──────────────────────

#[test]
fn meta_merge_overwrites_only_set_fields() {
    let mut meta = WidgetMeta::for_run(WidgetRole::RefineTerminal, "run-1");
    meta.focus = Some("tighten error copy".to_owned());
    let archived_at = Utc::now();
    meta.merge(WidgetMeta {
        role: Some(WidgetRole::SessionActionsArchived),
        archived_at: Some(archived_at),
        ..WidgetMeta::default()
    });
    assert_eq!(meta.role, Some(WidgetRole::SessionActionsArchived));
    assert_eq!(meta.archived_at, Some(archived_at));
    assert_eq!(meta.run_id.as_deref(), Some("run-1"));
    assert_eq!(meta.focus.as_deref(), Some("tighten error copy"));
}

#[test]
fn widget_lookups_respect_role_kind_and_run() {
    let mut session = Session::new("add retry backoff");
    session.widgets.push(Widget::terminal(
        "Plan Console Log",
        WidgetMeta::for_role(WidgetRole::PlanTerminal),
    ));
    session.widgets.push(Widget::progress(WidgetMeta::for_run(
        WidgetRole::RefineProgress,
        "run-1",
    )));
    session.widgets.push(Widget::terminal(
        "Refinement Log",
        WidgetMeta::for_run(WidgetRole::RefineTerminal, "run-1"),
    ));

    let terminal = session
        .widget_by_role(WidgetRole::PlanTerminal, WidgetKind::Terminal)
        .expect("plan terminal");
    assert_eq!(terminal.title.as_deref(), Some("Plan Console Log"));
    assert!(session
        .widget_by_role(WidgetRole::PlanTerminal, WidgetKind::Progress)
        .is_none());

    let run_widget = session
        .widget_for_run(WidgetRole::RefineTerminal, "run-1", WidgetKind::Terminal)
        .expect("refine terminal");
    assert_eq!(run_widget.meta.run_id.as_deref(), Some("run-1"));
    assert!(session
        .widget_for_run(WidgetRole::RefineTerminal, "run-2", WidgetKind::Terminal)
        .is_none());

    let id = run_widget.id.clone();
    assert!(session.widget_by_id(&id).is_some());
    assert!(session.widget_by_id("absent").is_none());
}

#[test]
fn refine_runs_are_found_by_id() {
    let mut session = Session::new("add retry backoff");
    session
        .refine_runs
        .push(RefineRun::with_id("run-7".to_owned(), "tighten error copy"));
    assert_eq!(
        session.refine_run("run-7").map(|run| run.focus.as_str()),
        Some("tighten error copy")
    );
    assert!(session.refine_run("run-8").is_none());
    let run = session.refine_run_mut("run-7").expect("mutable lookup");
    run.collapsed = true;
    assert!(session.refine_run("run-7").expect("run").collapsed);
}

#[test]
fn terminal_body_mutation_reaches_serialized_lines() {
    let mut widget = Widget::terminal(
        "Implementation Log",
        WidgetMeta::for_role(WidgetRole::ImplTerminal),
    );
    if let WidgetBody::Terminal { lines } = &mut widget.body {
        lines.push("> acw implement --issue 12".to_owned());
    }
    let value = serde_json::to_value(&widget).expect("widget value");
    assert_eq!(value["lines"][0], "> acw implement --issue 12");
}
