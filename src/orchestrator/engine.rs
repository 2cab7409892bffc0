//! The engine loop.
//!
//! One task owns the session store and folds two input streams into it:
//! intents from the host surface and lifecycle events from active runs.
//! Because the fold is serialized, no handler ever observes a half-applied
//! mutation, and every store write lands on disk before the next input is
//! taken.

use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{build_request, RunParams};
use crate::classify::{
    is_github_item_url, is_issue_reference, is_stage_line, scan_issue_number, scan_plan_path,
    scan_pr_url,
};
use crate::config::AppConfig;
use crate::executor::{RunEvent, RunEventPayload, RunExecutor};
use crate::models::refine::RefineRun;
use crate::models::rerun::RerunDirective;
use crate::models::run::RunKind;
use crate::models::session::{ActionMode, IssueState, RunStatus, Session};
use crate::models::widget::{
    ActionButton, ProgressEvent, Widget, WidgetKind, WidgetMeta, WidgetRole,
};
use crate::orchestrator::intent::Intent;
use crate::orchestrator::rerun::{
    build_rerun_from_failure, resolve_rerun_invocation, RerunInvocation,
};
use crate::persistence::blob::BlobStore;
use crate::persistence::store::SessionStore;
use crate::settings::resolve_backend_for_run;
use crate::surface::{
    build_action_buttons, implemented_marker, refined_marker, reran_marker,
};
use crate::tracker::IssueTracker;
use crate::ui::{UiSender, WidgetDelta};
use crate::workspace::{resolve_local_file, resolve_run_cwd};
use crate::{AppError, Result};

// ── Engine ──────────────────────────────────────────────────────────────────

/// Orchestration engine: owns the store and serializes all mutations.
pub struct Engine<B: BlobStore, E: RunExecutor, T: IssueTracker> {
    config: AppConfig,
    store: SessionStore<B>,
    executor: E,
    tracker: T,
    ui: UiSender,
    events_tx: mpsc::Sender<RunEvent>,
    /// Sessions whose plan run the user asked to stop, pending its exit.
    pending_user_stops: HashSet<String>,
}

impl<B: BlobStore, E: RunExecutor, T: IssueTracker> Engine<B, E, T> {
    /// Assemble an engine around an opened store.
    ///
    /// `events_tx` is the sending half of the run event channel whose
    /// receiver is later passed to [`Engine::run`].
    #[must_use]
    pub fn new(
        config: AppConfig,
        store: SessionStore<B>,
        executor: E,
        tracker: T,
        ui: UiSender,
        events_tx: mpsc::Sender<RunEvent>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            tracker,
            ui,
            events_tx,
            pending_user_stops: HashSet::new(),
        }
    }

    /// Drive the engine until `shutdown` fires or the intent stream closes.
    ///
    /// Posts the initial state snapshot and refreshes tracked issue states
    /// before entering the loop. Handler failures are logged and do not stop
    /// the loop.
    pub async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        mut events: mpsc::Receiver<RunEvent>,
        shutdown: CancellationToken,
    ) {
        self.post_state().await;
        self.refresh_issue_states().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("engine shutting down");
                    break;
                }
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        info!("intent stream closed, engine shutting down");
                        break;
                    };
                    if let Err(err) = self.handle_intent(intent).await {
                        warn!(%err, "intent handling failed");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break; };
                    if let Err(err) = self.handle_run_event(event).await {
                        warn!(%err, "run event handling failed");
                    }
                }
            }
        }
    }

    // ── Intent handling ─────────────────────────────────────────────────────

    async fn handle_intent(&mut self, intent: Intent) -> Result<()> {
        debug!(?intent, "handling intent");
        match intent {
            Intent::Ready => {
                self.post_state().await;
                self.refresh_issue_states().await;
                Ok(())
            }
            Intent::NewPlan { prompt } => self.on_new_plan(&prompt).await,
            Intent::RunPlan { session_id } => self.on_run_plan(&session_id).await,
            Intent::StopRun { session_id } => self.on_stop_run(&session_id).await,
            Intent::StartImplement {
                session_id,
                issue_number,
            } => self.on_start_implement(&session_id, issue_number.as_deref()).await,
            Intent::StartRefine {
                session_id,
                focus,
                run_id,
                issue_number,
            } => {
                self.on_start_refine(&session_id, &focus, run_id, issue_number.as_deref())
                    .await
            }
            Intent::Rerun { session_id } => self.on_rerun(&session_id).await,
            Intent::ToggleCollapse { session_id } => {
                let result = self.store_toggle(&session_id, ToggleTarget::Session);
                self.post_toggle(result).await
            }
            Intent::ToggleImplCollapse { session_id } => {
                let result = self.store_toggle(&session_id, ToggleTarget::Implementation);
                self.post_toggle(result).await
            }
            Intent::ToggleRefineCollapse { session_id, run_id } => {
                let result = self.store_toggle(&session_id, ToggleTarget::Refine(&run_id));
                self.post_toggle(result).await
            }
            Intent::DeleteSession { session_id } => self.on_delete_session(&session_id).await,
            Intent::UpdateDraft { value } => self.store.set_draft(&value),
            Intent::ViewPlan { session_id } => {
                self.on_view_plan(&session_id).await;
                Ok(())
            }
            Intent::ViewIssue { session_id } => {
                self.on_view_issue(&session_id).await;
                Ok(())
            }
            Intent::ViewPr { session_id } => {
                self.on_view_pr(&session_id).await;
                Ok(())
            }
            Intent::OpenExternal { url } => {
                if is_github_item_url(&url) {
                    self.ui.open_external(url).await;
                }
                Ok(())
            }
            Intent::OpenFile { path } => {
                let cwd = resolve_run_cwd(&self.config.workspace_root);
                let resolved =
                    resolve_local_file(&self.config.workspace_root, cwd.as_deref(), &path);
                self.ui.open_file(resolved).await;
                Ok(())
            }
        }
    }

    async fn on_new_plan(&mut self, prompt: &str) -> Result<()> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(());
        }
        let session = self.store.create_session(prompt)?;
        self.store.set_draft("")?;
        self.post_state().await;
        self.start_run(&session.id, RunParams::Plan { prompt }).await
    }

    async fn on_run_plan(&mut self, session_id: &str) -> Result<()> {
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        self.start_run(
            session_id,
            RunParams::Plan {
                prompt: &session.prompt,
            },
        )
        .await
    }

    async fn on_stop_run(&mut self, session_id: &str) -> Result<()> {
        let kind = [RunKind::Implement, RunKind::Refine, RunKind::Plan]
            .into_iter()
            .find(|kind| self.executor.is_running(session_id, Some(*kind)));
        let Some(kind) = kind else {
            return Ok(());
        };
        // Route stop feedback to the log of the run being stopped.
        let run_id = if kind == RunKind::Refine {
            self.store.session(session_id).and_then(|session| {
                session
                    .refine_runs
                    .iter()
                    .filter(|run| run.status.is_running())
                    .max_by_key(|run| run.updated_at)
                    .map(|run| run.id.clone())
            })
        } else {
            None
        };

        if !self.executor.stop(session_id) {
            self.append_system_line(
                session_id,
                kind,
                run_id.as_deref(),
                "Unable to stop: no active process found.".to_owned(),
            )
            .await?;
            self.sync_action_buttons(session_id).await?;
            return Ok(());
        }
        if kind == RunKind::Plan {
            self.pending_user_stops.insert(session_id.to_owned());
        }
        self.append_system_line(
            session_id,
            kind,
            run_id.as_deref(),
            "Stop requested by user.".to_owned(),
        )
        .await
    }

    async fn on_start_implement(
        &mut self,
        session_id: &str,
        issue_override: Option<&str>,
    ) -> Result<()> {
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        if session.status != RunStatus::Success {
            return self
                .append_impl_lines(
                    session_id,
                    vec!["Plan must succeed before implementation can start.".to_owned()],
                )
                .await;
        }
        if session.impl_status.is_running()
            || self.executor.is_running(session_id, Some(RunKind::Implement))
        {
            return self
                .append_impl_lines(session_id, vec!["Implementation already running.".to_owned()])
                .await;
        }
        let issue = issue_override
            .or(session.issue_number.as_deref())
            .unwrap_or_default()
            .trim()
            .to_owned();
        if issue.is_empty() {
            return self
                .append_impl_lines(
                    session_id,
                    vec!["Missing issue number for implementation.".to_owned()],
                )
                .await;
        }

        let cwd = resolve_run_cwd(&self.config.workspace_root);
        let state = self.tracker.issue_state(&issue, cwd.as_deref()).await;
        let updated = self
            .store
            .update(session_id, |session| session.issue_state = Some(state))?;
        self.ui.session_updated(&updated).await;
        if state == IssueState::Closed {
            self.append_impl_lines(session_id, vec![format!("Issue #{issue} is closed.")])
                .await?;
            self.sync_action_buttons(session_id).await?;
            return Ok(());
        }

        let updated = self.store.update(session_id, |session| {
            session.action_mode = ActionMode::Implement;
            session.rerun = None;
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await?;
        self.start_run(session_id, RunParams::Implement { issue: &issue })
            .await
    }

    async fn on_start_refine(
        &mut self,
        session_id: &str,
        focus: &str,
        run_id: Option<String>,
        issue_override: Option<&str>,
    ) -> Result<()> {
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        if !session.status.is_terminal() {
            return Ok(());
        }
        let focus = focus.trim();
        if focus.is_empty() {
            return Ok(());
        }
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let updated = self
            .store
            .add_refine_run(session_id, RefineRun::with_id(run_id.clone(), focus))?;
        self.ui.session_updated(&updated).await;
        let ensured =
            self.store
                .ensure_run_widgets(session_id, RunKind::Refine, Some(&run_id), Some(focus))?;
        self.announce_created(session_id, ensured.created).await;

        let candidate = issue_override
            .or(session.issue_number.as_deref())
            .unwrap_or_default()
            .trim()
            .to_owned();
        if !is_issue_reference(&candidate) {
            return self
                .fail_refine_run(
                    session_id,
                    &run_id,
                    "Missing issue number for refinement.".to_owned(),
                )
                .await;
        }
        if !parses_as_positive_issue(&candidate) {
            return self
                .fail_refine_run(
                    session_id,
                    &run_id,
                    "Invalid issue number for refinement.".to_owned(),
                )
                .await;
        }

        let updated = self.store.update(session_id, |session| {
            session.issue_number = Some(candidate.clone());
            session.action_mode = ActionMode::Refine;
            session.rerun = None;
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await?;
        self.start_run(
            session_id,
            RunParams::Refine {
                issue: &candidate,
                focus,
                run_id: &run_id,
            },
        )
        .await
    }

    async fn on_rerun(&mut self, session_id: &str) -> Result<()> {
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        let Some(invocation) = resolve_rerun_invocation(&session) else {
            return Ok(());
        };
        // Seed the directive before dispatch; its exit code stays unset
        // while the rerun is in flight.
        let directive = match &invocation {
            RerunInvocation::Plan => RerunDirective::new(RunKind::Plan, None, None, None),
            RerunInvocation::Implement { issue } => {
                RerunDirective::new(RunKind::Implement, None, Some(issue.clone()), None)
            }
            RerunInvocation::Refine { prompt, issue } => RerunDirective::new(
                RunKind::Refine,
                Some(prompt.clone()),
                Some(issue.clone()),
                None,
            ),
        };
        let updated = self.store.update(session_id, |session| {
            session.action_mode = ActionMode::Rerun;
            session.rerun = Some(directive);
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await?;

        match invocation {
            RerunInvocation::Plan => {
                self.start_run(
                    session_id,
                    RunParams::Plan {
                        prompt: &session.prompt,
                    },
                )
                .await
            }
            RerunInvocation::Implement { issue } => {
                let issue = issue.trim();
                if issue.is_empty() {
                    return Ok(());
                }
                self.start_run(session_id, RunParams::Implement { issue })
                    .await
            }
            RerunInvocation::Refine { prompt, issue } => {
                let focus = prompt.trim();
                if focus.is_empty()
                    || !is_issue_reference(&issue)
                    || !parses_as_positive_issue(&issue)
                {
                    return Ok(());
                }
                let run_id = Uuid::new_v4().to_string();
                let updated = self
                    .store
                    .add_refine_run(session_id, RefineRun::with_id(run_id.clone(), focus))?;
                self.ui.session_updated(&updated).await;
                let ensured = self.store.ensure_run_widgets(
                    session_id,
                    RunKind::Refine,
                    Some(&run_id),
                    Some(focus),
                )?;
                self.announce_created(session_id, ensured.created).await;
                self.start_run(
                    session_id,
                    RunParams::Refine {
                        issue: &issue,
                        focus,
                        run_id: &run_id,
                    },
                )
                .await
            }
        }
    }

    async fn on_delete_session(&mut self, session_id: &str) -> Result<()> {
        if self.executor.is_running(session_id, None) {
            self.executor.stop(session_id);
        }
        self.pending_user_stops.remove(session_id);
        if self.store.delete_session(session_id)? {
            self.ui.session_deleted(session_id).await;
        }
        Ok(())
    }

    async fn on_view_plan(&mut self, session_id: &str) {
        let Some(session) = self.store.session(session_id) else {
            return;
        };
        let Some(path) = session
            .plan_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
        else {
            return;
        };
        let cwd = resolve_run_cwd(&self.config.workspace_root);
        let resolved = resolve_local_file(&self.config.workspace_root, cwd.as_deref(), path);
        self.ui.open_file(resolved).await;
    }

    async fn on_view_issue(&mut self, session_id: &str) {
        let Some(session) = self.store.session(session_id) else {
            return;
        };
        let Some(issue) = session
            .issue_number
            .as_deref()
            .map(str::trim)
            .filter(|issue| !issue.is_empty())
        else {
            return;
        };
        let cwd = resolve_run_cwd(&self.config.workspace_root);
        let Some(url) = self.tracker.issue_url(issue, cwd.as_deref()).await else {
            return;
        };
        if is_github_item_url(&url) {
            self.ui.open_external(url).await;
        }
    }

    async fn on_view_pr(&mut self, session_id: &str) {
        let Some(session) = self.store.session(session_id) else {
            return;
        };
        if let Some(url) = session.pr_url {
            if is_github_item_url(&url) {
                self.ui.open_external(url).await;
            }
        }
    }

    fn store_toggle(&mut self, session_id: &str, target: ToggleTarget<'_>) -> Result<Session> {
        match target {
            ToggleTarget::Session => self.store.toggle_collapse(session_id),
            ToggleTarget::Implementation => self.store.toggle_impl_collapse(session_id),
            ToggleTarget::Refine(run_id) => self.store.toggle_refine_collapse(session_id, run_id),
        }
    }

    /// Post a toggle result; an unknown session or run is ignored.
    async fn post_toggle(&mut self, result: Result<Session>) -> Result<()> {
        match result {
            Ok(session) => {
                self.ui.session_updated(&session).await;
                Ok(())
            }
            Err(AppError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    // ── Run lifecycle ───────────────────────────────────────────────────────

    /// Admit, prepare, and launch one run.
    ///
    /// Admissibility is checked against both the executor (at most one
    /// process per session) and the record's own statuses; rejected launches
    /// leave a line in the target run's log.
    #[allow(clippy::too_many_lines)] // Admission, prep, and launch are inherently sequential.
    async fn start_run(&mut self, session_id: &str, params: RunParams<'_>) -> Result<()> {
        let kind = params.kind();
        let run_id = match &params {
            RunParams::Refine { run_id, .. } => Some((*run_id).to_owned()),
            _ => None,
        };

        if self.executor.is_running(session_id, None) {
            return self
                .append_system_line(
                    session_id,
                    kind,
                    run_id.as_deref(),
                    "Session already running.".to_owned(),
                )
                .await;
        }
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        if kind == RunKind::Plan && session.status.is_running() {
            return self
                .append_system_line(
                    session_id,
                    kind,
                    run_id.as_deref(),
                    "Session already running.".to_owned(),
                )
                .await;
        }
        if kind == RunKind::Implement && session.impl_status.is_running() {
            return self
                .append_system_line(
                    session_id,
                    kind,
                    run_id.as_deref(),
                    "Implementation already running.".to_owned(),
                )
                .await;
        }
        if kind == RunKind::Refine && session.has_running_refine() {
            if let Some(run_id) = run_id.as_deref() {
                self.store.update(session_id, |session| {
                    if let Some(run) = session.refine_run_mut(run_id) {
                        run.status = RunStatus::Error;
                        run.updated_at = Utc::now();
                    }
                })?;
                self.append_refine_lines(
                    session_id,
                    run_id,
                    vec!["Refinement already running.".to_owned()],
                )
                .await?;
                self.sync_action_buttons(session_id).await?;
            }
            return Ok(());
        }

        let Some(cwd) = resolve_run_cwd(&self.config.workspace_root) else {
            self.append_system_line(
                session_id,
                kind,
                run_id.as_deref(),
                "Missing workspace or trees/main path.".to_owned(),
            )
            .await?;
            return self
                .record_launch_failure(session_id, kind, run_id.as_deref())
                .await;
        };

        // Prepare the record before launch so the surface reflects the run
        // immediately, not at the first output line.
        match &params {
            RunParams::Plan { .. } => {
                let ensured = self
                    .store
                    .ensure_run_widgets(session_id, RunKind::Plan, None, None)?;
                self.announce_created(session_id, ensured.created).await;
                let updated = self.store.update(session_id, |session| {
                    session.impl_status = RunStatus::Idle;
                    session.status = RunStatus::Running;
                })?;
                self.ui.session_updated(&updated).await;
            }
            RunParams::Implement { issue } => {
                let ensured =
                    self.store
                        .ensure_run_widgets(session_id, RunKind::Implement, None, None)?;
                self.announce_created(session_id, ensured.created).await;
                let updated = self.store.update(session_id, |session| {
                    if session.issue_number.as_deref() != Some(*issue) {
                        session.issue_state = None;
                    }
                    session.issue_number = Some((*issue).to_owned());
                    session.impl_status = RunStatus::Running;
                })?;
                self.ui.session_updated(&updated).await;
            }
            RunParams::Refine { issue, run_id, .. } => {
                let updated = self.store.update(session_id, |session| {
                    session.issue_number = Some((*issue).to_owned());
                    if let Some(run) = session.refine_run_mut(run_id) {
                        run.status = RunStatus::Running;
                        run.updated_at = Utc::now();
                    }
                })?;
                self.ui.session_updated(&updated).await;
            }
        }
        self.sync_action_buttons(session_id).await?;

        let backend = resolve_backend_for_run(&cwd);
        let request = build_request(
            &self.config.agent,
            session_id,
            cwd,
            &params,
            backend.as_deref(),
        );
        if !self.executor.run(request, self.events_tx.clone()) {
            self.append_system_line(
                session_id,
                kind,
                run_id.as_deref(),
                kind.launch_failure_line().to_owned(),
            )
            .await?;
            return self
                .record_launch_failure(session_id, kind, run_id.as_deref())
                .await;
        }
        Ok(())
    }

    /// Mark the target slot errored after a launch that never produced a
    /// process, and settle any rerun bookkeeping.
    async fn record_launch_failure(
        &mut self,
        session_id: &str,
        kind: RunKind,
        run_id: Option<&str>,
    ) -> Result<()> {
        let updated = self.store.update(session_id, |session| {
            match kind {
                RunKind::Plan => session.status = RunStatus::Error,
                RunKind::Implement => session.impl_status = RunStatus::Error,
                RunKind::Refine => {
                    if let Some(run_id) = run_id {
                        if let Some(run) = session.refine_run_mut(run_id) {
                            run.status = RunStatus::Error;
                            run.updated_at = Utc::now();
                        }
                    }
                }
            }
            if session.action_mode == ActionMode::Rerun {
                session.action_mode = ActionMode::Default;
                if let Some(directive) = &mut session.rerun {
                    directive.last_exit_code = Some(1);
                    directive.updated_at = Utc::now();
                }
            } else {
                session.action_mode = ActionMode::Default;
            }
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await
    }

    async fn fail_refine_run(
        &mut self,
        session_id: &str,
        run_id: &str,
        line: String,
    ) -> Result<()> {
        self.store.update(session_id, |session| {
            if let Some(run) = session.refine_run_mut(run_id) {
                run.status = RunStatus::Error;
                run.updated_at = Utc::now();
            }
        })?;
        self.append_refine_lines(session_id, run_id, vec![line])
            .await?;
        self.sync_action_buttons(session_id).await
    }

    // ── Run events ──────────────────────────────────────────────────────────

    async fn handle_run_event(&mut self, event: RunEvent) -> Result<()> {
        let Some(pre) = self.store.session(&event.session_id) else {
            debug!(session_id = %event.session_id, "dropping event for unknown session");
            return Ok(());
        };
        match &event.payload {
            RunEventPayload::Start { command } => self.on_run_start(&event, command).await,
            RunEventPayload::Stdout { line } => self.on_run_output(&event, line, false).await,
            RunEventPayload::Stderr { line } => self.on_run_output(&event, line, true).await,
            RunEventPayload::Exit { code, signal } => {
                self.on_run_exit(&event, &pre, *code, signal.as_deref()).await
            }
        }
    }

    async fn on_run_start(&mut self, event: &RunEvent, command: &str) -> Result<()> {
        let session_id = &event.session_id;
        let echo = format!("> {command}");
        match event.kind {
            RunKind::Implement => {
                let updated = self.store.update(session_id, |session| {
                    session.impl_status = RunStatus::Running;
                })?;
                self.ui.session_updated(&updated).await;
                self.append_impl_lines(session_id, vec![echo]).await?;
            }
            RunKind::Refine => {
                if let Some(run_id) = event.run_id.clone() {
                    let updated = self.store.update(session_id, |session| {
                        if let Some(run) = session.refine_run_mut(&run_id) {
                            run.status = RunStatus::Running;
                            run.updated_at = Utc::now();
                        }
                    })?;
                    self.ui.session_updated(&updated).await;
                    self.append_refine_lines(session_id, &run_id, vec![echo])
                        .await?;
                } else {
                    self.append_plan_lines(session_id, vec![echo]).await?;
                }
            }
            RunKind::Plan => {
                let updated = self.store.update(session_id, |session| {
                    session.status = RunStatus::Running;
                    session.command = Some(command.to_owned());
                })?;
                self.ui.session_updated(&updated).await;
                self.append_plan_lines(session_id, vec![echo]).await?;
            }
        }
        self.sync_action_buttons(session_id).await
    }

    /// Fold one output line: store it (stderr lines prefixed), then scan the
    /// raw text for durable attributes and stage announcements.
    async fn on_run_output(&mut self, event: &RunEvent, raw: &str, stderr: bool) -> Result<()> {
        let session_id = &event.session_id;
        let stored = if stderr {
            format!("stderr: {raw}")
        } else {
            raw.to_owned()
        };
        match event.kind {
            RunKind::Implement => {
                self.append_impl_lines(session_id, vec![stored]).await?;
                if stderr && is_stage_line(raw) {
                    self.record_stage(event, raw).await?;
                }
                self.capture_pr_url(session_id, raw).await?;
            }
            RunKind::Refine => {
                if let Some(run_id) = event.run_id.clone() {
                    self.append_refine_lines(session_id, &run_id, vec![stored])
                        .await?;
                    if stderr && is_stage_line(raw) {
                        self.record_stage(event, raw).await?;
                    }
                }
                self.capture_plan_path(session_id, raw).await?;
            }
            RunKind::Plan => {
                self.append_plan_lines(session_id, vec![stored]).await?;
                if stderr && is_stage_line(raw) {
                    self.record_stage(event, raw).await?;
                }
                self.capture_issue_number(session_id, raw).await?;
                self.capture_plan_path(session_id, raw).await?;
            }
        }
        Ok(())
    }

    async fn on_run_exit(
        &mut self,
        event: &RunEvent,
        pre: &Session,
        code: Option<i32>,
        signal: Option<&str>,
    ) -> Result<()> {
        let session_id = &event.session_id;
        let run_id = event.run_id.as_deref();
        let status = if code == Some(0) {
            RunStatus::Success
        } else {
            RunStatus::Error
        };
        let was_user_stop = self.pending_user_stops.remove(session_id);

        let updated = self.store.update(session_id, |session| match event.kind {
            RunKind::Implement => session.impl_status = status,
            RunKind::Refine => {
                if let Some(run_id) = run_id {
                    if let Some(run) = session.refine_run_mut(run_id) {
                        run.status = status;
                        run.updated_at = Utc::now();
                    }
                }
                // A rerun of a refinement settles the plan-level status too.
                if pre.action_mode == ActionMode::Rerun {
                    session.status = status;
                }
            }
            RunKind::Plan => session.status = status,
        })?;
        self.ui.session_updated(&updated).await;

        if event.kind == RunKind::Plan && was_user_stop && code != Some(0) {
            self.append_plan_lines(session_id, vec!["Plan run stopped by user.".to_owned()])
                .await?;
        }
        let exit_line = match (signal, code) {
            (Some(signal), _) => format!("Exit signal: {signal}"),
            (None, Some(code)) => format!("Exit code: {code}"),
            (None, None) => "Exit code: null".to_owned(),
        };
        self.append_system_line(session_id, event.kind, run_id, exit_line)
            .await?;

        if let Some(widget_id) = self
            .push_progress(event, ProgressEvent::Exit { at: event.at })
            .await?
        {
            self.ui
                .widget_update(session_id, &widget_id, WidgetDelta::Complete)
                .await;
        }

        let normalized = code.unwrap_or(1);
        let updated = self.store.update(session_id, |session| {
            session.action_mode = ActionMode::Default;
            if code == Some(0) {
                if let Some(directive) = &mut session.rerun {
                    directive.last_exit_code = Some(0);
                    directive.updated_at = Utc::now();
                }
            } else {
                session.rerun = Some(build_rerun_from_failure(pre, event.kind, normalized, run_id));
            }
        })?;
        self.ui.session_updated(&updated).await;

        // Freeze the action row the finished intent was started from.
        let marker = match pre.action_mode {
            ActionMode::Rerun => Some(reran_marker(code == Some(0))),
            ActionMode::Refine if event.kind == RunKind::Refine => {
                Some(refined_marker(code == Some(0)))
            }
            ActionMode::Implement if event.kind == RunKind::Implement => {
                Some(implemented_marker(code == Some(0)))
            }
            _ => None,
        };
        if let Some(marker) = marker {
            self.archive_action_row(session_id, marker).await?;
        }
        self.sync_action_buttons(session_id).await
    }

    // ── Output scanning ─────────────────────────────────────────────────────

    async fn capture_issue_number(&mut self, session_id: &str, raw: &str) -> Result<()> {
        let Some(issue) = scan_issue_number(raw) else {
            return Ok(());
        };
        // Recorded even when unchanged: a fresh sighting resets the cached
        // issue state so the next check re-queries the tracker.
        let updated = self.store.update(session_id, |session| {
            session.issue_number = Some(issue.clone());
            session.issue_state = None;
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await
    }

    async fn capture_plan_path(&mut self, session_id: &str, raw: &str) -> Result<()> {
        let Some(path) = scan_plan_path(raw) else {
            return Ok(());
        };
        let current = self.store.session(session_id).and_then(|s| s.plan_path);
        if current.as_deref() == Some(path.as_str()) {
            return Ok(());
        }
        let updated = self.store.update(session_id, |session| {
            session.plan_path = Some(path.clone());
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await
    }

    async fn capture_pr_url(&mut self, session_id: &str, raw: &str) -> Result<()> {
        let Some(url) = scan_pr_url(raw) else {
            return Ok(());
        };
        let current = self.store.session(session_id).and_then(|s| s.pr_url);
        if current.as_deref() == Some(url.as_str()) {
            return Ok(());
        }
        let updated = self.store.update(session_id, |session| {
            session.pr_url = Some(url.clone());
        })?;
        self.ui.session_updated(&updated).await;
        self.sync_action_buttons(session_id).await
    }

    async fn record_stage(&mut self, event: &RunEvent, raw: &str) -> Result<()> {
        let stage = ProgressEvent::Stage {
            label: raw.to_owned(),
            at: event.at,
        };
        self.push_progress(event, stage).await?;
        Ok(())
    }

    /// Append one marker to the run's progress widget, if it exists.
    ///
    /// Returns the widget identifier that was touched.
    async fn push_progress(
        &mut self,
        event: &RunEvent,
        progress: ProgressEvent,
    ) -> Result<Option<String>> {
        let role = event.kind.progress_role();
        let widget_id = self.store.session(&event.session_id).and_then(|session| {
            match event.run_id.as_deref() {
                Some(run_id) => session
                    .widget_for_run(role, run_id, WidgetKind::Progress)
                    .map(|widget| widget.id.clone()),
                None => session
                    .widget_by_role(role, WidgetKind::Progress)
                    .map(|widget| widget.id.clone()),
            }
        });
        let Some(widget_id) = widget_id else {
            return Ok(None);
        };
        self.store
            .push_progress_event(&event.session_id, &widget_id, progress.clone())?;
        self.ui
            .widget_update(
                &event.session_id,
                &widget_id,
                WidgetDelta::AppendEvents {
                    events: vec![progress],
                },
            )
            .await;
        Ok(Some(widget_id))
    }

    // ── Widgets and posting ─────────────────────────────────────────────────

    async fn announce_created(&mut self, session_id: &str, created: Vec<Widget>) {
        for widget in created {
            self.ui.widget_append(session_id, widget).await;
        }
    }

    /// Route an orchestrator-generated line to the log the run kind owns.
    async fn append_system_line(
        &mut self,
        session_id: &str,
        kind: RunKind,
        run_id: Option<&str>,
        line: String,
    ) -> Result<()> {
        match kind {
            RunKind::Implement => self.append_impl_lines(session_id, vec![line]).await,
            RunKind::Refine => match run_id {
                Some(run_id) => self.append_refine_lines(session_id, run_id, vec![line]).await,
                None => self.append_plan_lines(session_id, vec![line]).await,
            },
            RunKind::Plan => self.append_plan_lines(session_id, vec![line]).await,
        }
    }

    async fn append_plan_lines(&mut self, session_id: &str, lines: Vec<String>) -> Result<()> {
        let ensured = self
            .store
            .ensure_run_widgets(session_id, RunKind::Plan, None, None)?;
        self.announce_created(session_id, ensured.created).await;
        let session =
            self.store
                .append_plan_lines(session_id, Some(&ensured.terminal_id), &lines)?;
        self.ui
            .widget_update(
                session_id,
                &ensured.terminal_id,
                WidgetDelta::AppendLines { lines },
            )
            .await;
        self.ui.session_updated(&session).await;
        Ok(())
    }

    async fn append_impl_lines(&mut self, session_id: &str, lines: Vec<String>) -> Result<()> {
        let ensured = self
            .store
            .ensure_run_widgets(session_id, RunKind::Implement, None, None)?;
        self.announce_created(session_id, ensured.created).await;
        let session =
            self.store
                .append_impl_lines(session_id, Some(&ensured.terminal_id), &lines)?;
        self.ui
            .widget_update(
                session_id,
                &ensured.terminal_id,
                WidgetDelta::AppendLines { lines },
            )
            .await;
        self.ui.session_updated(&session).await;
        Ok(())
    }

    async fn append_refine_lines(
        &mut self,
        session_id: &str,
        run_id: &str,
        lines: Vec<String>,
    ) -> Result<()> {
        let focus = self
            .store
            .session(session_id)
            .and_then(|session| session.refine_run(run_id).map(|run| run.focus.clone()));
        let ensured = self.store.ensure_run_widgets(
            session_id,
            RunKind::Refine,
            Some(run_id),
            Some(focus.as_deref().unwrap_or("Refinement")),
        )?;
        self.announce_created(session_id, ensured.created).await;
        // Lines for a run record that no longer exists are dropped.
        if focus.is_none() {
            return Ok(());
        }
        let session = self.store.append_refine_lines(
            session_id,
            run_id,
            Some(&ensured.terminal_id),
            &lines,
        )?;
        self.ui
            .widget_update(
                session_id,
                &ensured.terminal_id,
                WidgetDelta::AppendLines { lines },
            )
            .await;
        self.ui.session_updated(&session).await;
        Ok(())
    }

    /// Rebuild the live action row from current session state.
    async fn sync_action_buttons(&mut self, session_id: &str) -> Result<()> {
        let Some(session) = self.store.session(session_id) else {
            return Ok(());
        };
        let has_target = resolve_rerun_invocation(&session).is_some();
        let buttons = build_action_buttons(&session, has_target);
        let (widget_id, created) = self
            .store
            .ensure_action_widget(session_id, buttons.clone())?;
        if let Some(widget) = created {
            self.ui.widget_append(session_id, widget).await;
            return Ok(());
        }
        self.store
            .set_widget_buttons(session_id, &widget_id, buttons.clone())?;
        self.ui
            .widget_update(
                session_id,
                &widget_id,
                WidgetDelta::ReplaceButtons { buttons },
            )
            .await;
        Ok(())
    }

    /// Freeze the live action row into an archived marker record.
    async fn archive_action_row(&mut self, session_id: &str, marker: ActionButton) -> Result<()> {
        let widget_id = self.store.session(session_id).and_then(|session| {
            session
                .widget_by_role(WidgetRole::SessionActions, WidgetKind::Buttons)
                .map(|widget| widget.id.clone())
        });
        let Some(widget_id) = widget_id else {
            return Ok(());
        };
        let patch = WidgetMeta {
            role: Some(WidgetRole::SessionActionsArchived),
            archived_at: Some(Utc::now()),
            ..WidgetMeta::default()
        };
        self.store
            .merge_widget_meta(session_id, &widget_id, patch.clone())?;
        self.ui
            .widget_update(
                session_id,
                &widget_id,
                WidgetDelta::Metadata { metadata: patch },
            )
            .await;
        let buttons = vec![marker];
        self.store
            .set_widget_buttons(session_id, &widget_id, buttons.clone())?;
        self.ui
            .widget_update(
                session_id,
                &widget_id,
                WidgetDelta::ReplaceButtons { buttons },
            )
            .await;
        Ok(())
    }

    /// Rebuild every action row, then replace the surface's whole state.
    async fn post_state(&mut self) {
        let ids: Vec<String> = self
            .store
            .sessions()
            .iter()
            .map(|session| session.id.clone())
            .collect();
        for session_id in &ids {
            if let Err(err) = self.sync_action_buttons(session_id).await {
                warn!(%session_id, %err, "action button sync failed");
            }
        }
        self.ui
            .state_replace(self.store.sessions(), self.store.draft().to_owned())
            .await;
    }

    /// Re-query the tracker for every session with a linked issue.
    async fn refresh_issue_states(&mut self) {
        let cwd = resolve_run_cwd(&self.config.workspace_root);
        for session in self.store.sessions() {
            let Some(issue) = session
                .issue_number
                .as_deref()
                .map(str::trim)
                .filter(|issue| !issue.is_empty())
                .map(ToOwned::to_owned)
            else {
                continue;
            };
            let state = self.tracker.issue_state(&issue, cwd.as_deref()).await;
            if session.issue_state == Some(state) {
                continue;
            }
            let result = self
                .store
                .update(&session.id, |session| session.issue_state = Some(state));
            match result {
                Ok(updated) => {
                    self.ui.session_updated(&updated).await;
                    if let Err(err) = self.sync_action_buttons(&session.id).await {
                        warn!(session_id = %session.id, %err, "action button sync failed");
                    }
                }
                Err(err) => {
                    warn!(session_id = %session.id, %err, "issue state update failed");
                }
            }
        }
    }
}

/// Fold targets for the three collapse toggles.
enum ToggleTarget<'a> {
    Session,
    Implementation,
    Refine(&'a str),
}

/// Whether an already digits-only issue reference is a usable positive number.
fn parses_as_positive_issue(candidate: &str) -> bool {
    candidate.parse::<u64>().is_ok_and(|issue| issue > 0)
}
