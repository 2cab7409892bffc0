//! In-memory session store with write-through persistence.
//!
//! Every mutation goes through [`SessionStore::update`], which re-derives the
//! lifecycle phase, enforces log caps, stamps the activity timestamp, and
//! writes the record through the blob backend before returning. Reads hand
//! out deep copies; callers never hold references into store-owned state.

use chrono::Utc;

use crate::models::refine::RefineRun;
use crate::models::run::RunKind;
use crate::models::session::{trim_log, Session};
use crate::models::widget::{
    trim_events, ActionButton, ProgressEvent, Widget, WidgetBody, WidgetKind, WidgetMeta,
    WidgetRole,
};
use crate::persistence::blob::BlobStore;
use crate::persistence::migrate::migrate_session;
use crate::{AppError, Result};

/// Identifiers of a run's ensured widget pair, plus any widgets the call
/// had to create (so the caller can announce them to the UI).
#[derive(Debug, Clone)]
pub struct EnsuredWidgets {
    /// The run's terminal widget.
    pub terminal_id: String,
    /// The run's progress widget.
    pub progress_id: String,
    /// Widgets created by this call, in creation order.
    pub created: Vec<Widget>,
}

/// Owner of all live session records.
pub struct SessionStore<B: BlobStore> {
    blob: B,
    sessions: Vec<Session>,
    draft: String,
}

impl<B: BlobStore> SessionStore<B> {
    /// Load all records from the backend, migrating legacy schemas in place.
    ///
    /// Migrated records are written back immediately. The list is kept
    /// newest-created first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend cannot be read or a migrated
    /// record cannot be written back.
    pub fn open(blob: B) -> Result<Self> {
        let mut sessions = blob.load_all()?;
        for session in &mut sessions {
            if migrate_session(session) {
                blob.put(session)?;
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let draft = blob.load_draft()?.unwrap_or_default();
        Ok(Self {
            blob,
            sessions,
            draft,
        })
    }

    /// Deep copies of every session, newest-created first.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.clone()
    }

    /// Deep copy of one session.
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .iter()
            .find(|session| session.id == session_id)
            .cloned()
    }

    /// The persisted new-session draft prompt.
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace and persist the new-session draft prompt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the draft cannot be written.
    pub fn set_draft(&mut self, value: &str) -> Result<()> {
        self.draft = value.to_owned();
        self.blob.put_draft(value)
    }

    /// Create, persist, and return a fresh session for `prompt`.
    ///
    /// The prompt is stored trimmed; title derivation sees the same text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the record cannot be written.
    pub fn create_session(&mut self, prompt: &str) -> Result<Session> {
        let session = Session::new(prompt.trim());
        self.blob.put(&session)?;
        self.sessions.insert(0, session.clone());
        Ok(session)
    }

    /// Delete a session record; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend fails to delete.
    pub fn delete_session(&mut self, session_id: &str) -> Result<bool> {
        let before = self.sessions.len();
        self.sessions.retain(|session| session.id != session_id);
        if self.sessions.len() == before {
            return Ok(false);
        }
        self.blob.remove(session_id)?;
        Ok(true)
    }

    /// Apply a mutation to one session, enforce invariants, persist, and
    /// return a deep copy of the result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist and
    /// `AppError::Store` if the record cannot be written.
    pub fn update(
        &mut self,
        session_id: &str,
        mutate: impl FnOnce(&mut Session),
    ) -> Result<Session> {
        let session = self
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
            .ok_or_else(|| AppError::NotFound(format!("session not found: {session_id}")))?;

        mutate(session);
        enforce_invariants(session);
        self.blob.put(session)?;
        Ok(session.clone())
    }

    /// Ensure a run's terminal and progress widget pair exists.
    ///
    /// Widgets are located by role (and `run_id` for refine runs) and created
    /// when missing; the progress widget is linked to its terminal. `focus`
    /// is stamped onto a newly created refine terminal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn ensure_run_widgets(
        &mut self,
        session_id: &str,
        kind: RunKind,
        run_id: Option<&str>,
        focus: Option<&str>,
    ) -> Result<EnsuredWidgets> {
        let mut terminal_id = String::new();
        let mut progress_id = String::new();
        let mut created = Vec::new();
        self.update(session_id, |session| {
            let role = kind.terminal_role();
            let existing = match run_id {
                Some(run_id) => session.widget_for_run(role, run_id, WidgetKind::Terminal),
                None => session.widget_by_role(role, WidgetKind::Terminal),
            };
            terminal_id = if let Some(widget) = existing {
                widget.id.clone()
            } else {
                let mut meta = WidgetMeta::for_role(role);
                meta.run_id = run_id.map(ToOwned::to_owned);
                meta.focus = focus.map(ToOwned::to_owned);
                let widget = Widget::terminal(kind.terminal_title(), meta);
                let id = widget.id.clone();
                created.push(widget.clone());
                session.widgets.push(widget);
                id
            };

            let role = kind.progress_role();
            let existing = match run_id {
                Some(run_id) => session.widget_for_run(role, run_id, WidgetKind::Progress),
                None => session.widget_by_role(role, WidgetKind::Progress),
            };
            progress_id = if let Some(widget) = existing {
                widget.id.clone()
            } else {
                let mut meta = WidgetMeta::for_role(role);
                meta.run_id = run_id.map(ToOwned::to_owned);
                meta.terminal_id = Some(terminal_id.clone());
                let widget = Widget::progress(meta);
                let id = widget.id.clone();
                created.push(widget.clone());
                session.widgets.push(widget);
                id
            };
        })?;
        Ok(EnsuredWidgets {
            terminal_id,
            progress_id,
            created,
        })
    }

    /// Ensure the live action-button row exists, seeding it with `initial`
    /// when created.
    ///
    /// Archived rows are ignored by the lookup; there is at most one live row
    /// per session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn ensure_action_widget(
        &mut self,
        session_id: &str,
        initial: Vec<ActionButton>,
    ) -> Result<(String, Option<Widget>)> {
        let mut widget_id = String::new();
        let mut created = None;
        self.update(session_id, |session| {
            if let Some(widget) =
                session.widget_by_role(WidgetRole::SessionActions, WidgetKind::Buttons)
            {
                widget_id = widget.id.clone();
            } else {
                let widget = Widget::buttons(initial, WidgetMeta::for_role(WidgetRole::SessionActions));
                widget_id = widget.id.clone();
                created = Some(widget.clone());
                session.widgets.push(widget);
            }
        })?;
        Ok((widget_id, created))
    }

    /// Append lines to the plan log and its terminal widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn append_plan_lines(
        &mut self,
        session_id: &str,
        widget_id: Option<&str>,
        lines: &[String],
    ) -> Result<Session> {
        self.update(session_id, |session| {
            session.logs.extend(lines.iter().cloned());
            if let Some(widget_id) = widget_id {
                if let Some(widget) = session.widget_by_id_mut(widget_id) {
                    if let WidgetBody::Terminal { lines: existing } = &mut widget.body {
                        existing.extend(lines.iter().cloned());
                    }
                }
            }
        })
    }

    /// Append lines to the implementation log and its terminal widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn append_impl_lines(
        &mut self,
        session_id: &str,
        widget_id: Option<&str>,
        lines: &[String],
    ) -> Result<Session> {
        self.update(session_id, |session| {
            session.impl_logs.extend(lines.iter().cloned());
            if let Some(widget_id) = widget_id {
                if let Some(widget) = session.widget_by_id_mut(widget_id) {
                    if let WidgetBody::Terminal { lines: existing } = &mut widget.body {
                        existing.extend(lines.iter().cloned());
                    }
                }
            }
        })
    }

    /// Append lines to one refine run's log and its terminal widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn append_refine_lines(
        &mut self,
        session_id: &str,
        run_id: &str,
        widget_id: Option<&str>,
        lines: &[String],
    ) -> Result<Session> {
        self.update(session_id, |session| {
            if let Some(run) = session.refine_run_mut(run_id) {
                run.logs.extend(lines.iter().cloned());
                run.updated_at = Utc::now();
            }
            if let Some(widget_id) = widget_id {
                if let Some(widget) = session.widget_by_id_mut(widget_id) {
                    if let WidgetBody::Terminal { lines: existing } = &mut widget.body {
                        existing.extend(lines.iter().cloned());
                    }
                }
            }
        })
    }

    /// Record a new refine run on a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn add_refine_run(&mut self, session_id: &str, run: RefineRun) -> Result<Session> {
        self.update(session_id, |session| session.refine_runs.push(run))
    }

    /// Append a marker to a progress widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn push_progress_event(
        &mut self,
        session_id: &str,
        widget_id: &str,
        event: ProgressEvent,
    ) -> Result<Session> {
        self.update(session_id, |session| {
            if let Some(widget) = session.widget_by_id_mut(widget_id) {
                if let WidgetBody::Progress { events } = &mut widget.body {
                    events.push(event);
                }
            }
        })
    }

    /// Replace the button set of a button-row widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn set_widget_buttons(
        &mut self,
        session_id: &str,
        widget_id: &str,
        buttons: Vec<ActionButton>,
    ) -> Result<Session> {
        self.update(session_id, |session| {
            if let Some(widget) = session.widget_by_id_mut(widget_id) {
                if let WidgetBody::Buttons { buttons: existing } = &mut widget.body {
                    *existing = buttons;
                }
            }
        })
    }

    /// Shallow-merge a metadata patch into a widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn merge_widget_meta(
        &mut self,
        session_id: &str,
        widget_id: &str,
        patch: WidgetMeta,
    ) -> Result<Session> {
        self.update(session_id, |session| {
            if let Some(widget) = session.widget_by_id_mut(widget_id) {
                widget.meta.merge(patch);
            }
        })
    }

    /// Flip the session card fold.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn toggle_collapse(&mut self, session_id: &str) -> Result<Session> {
        self.update(session_id, |session| session.collapsed = !session.collapsed)
    }

    /// Flip the implementation section fold.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Store` as [`Self::update`].
    pub fn toggle_impl_collapse(&mut self, session_id: &str) -> Result<Session> {
        self.update(session_id, |session| {
            session.impl_collapsed = !session.impl_collapsed;
        })
    }

    /// Flip one refine run's fold.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session or run does not exist and
    /// `AppError::Store` if the record cannot be written.
    pub fn toggle_refine_collapse(&mut self, session_id: &str, run_id: &str) -> Result<Session> {
        let known = self
            .session(session_id)
            .is_some_and(|session| session.refine_run(run_id).is_some());
        if !known {
            return Err(AppError::NotFound(format!(
                "refine run not found: {run_id}"
            )));
        }
        self.update(session_id, |session| {
            if let Some(run) = session.refine_run_mut(run_id) {
                run.collapsed = !run.collapsed;
            }
        })
    }
}

/// Re-derive the phase, cap every log sequence, and stamp activity.
fn enforce_invariants(session: &mut Session) {
    session.phase = session.derived_phase();
    trim_log(&mut session.logs);
    trim_log(&mut session.impl_logs);
    for run in &mut session.refine_runs {
        trim_log(&mut run.logs);
    }
    for widget in &mut session.widgets {
        match &mut widget.body {
            WidgetBody::Terminal { lines } => trim_log(lines),
            WidgetBody::Progress { events } => trim_events(events),
            WidgetBody::Buttons { .. } => {}
        }
    }
    session.touch();
}
