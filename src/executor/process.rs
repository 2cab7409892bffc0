//! Process-backed run executor.
//!
//! Spawns the agent CLI with piped output, forwards each stream line by line
//! as [`RunEvent`]s, and reports a single exit event once both streams have
//! drained. A per-session registry enforces the one-active-run rule and
//! carries the cancellation handle used by stop requests.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::RunRequest;
use crate::executor::{RunEvent, RunEventPayload, RunExecutor};
use crate::models::run::RunKind;

/// Which output stream a reader task is draining.
#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Bookkeeping for one live run.
struct ActiveRun {
    kind: RunKind,
    cancel: CancellationToken,
}

/// [`RunExecutor`] backed by real child processes.
#[derive(Default)]
pub struct ProcessExecutor {
    registry: Arc<Mutex<HashMap<String, ActiveRun>>>,
}

impl ProcessExecutor {
    /// Create an executor with no active runs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunExecutor for ProcessExecutor {
    fn run(&self, request: RunRequest, events_tx: mpsc::Sender<RunEvent>) -> bool {
        let mut registry = self.lock();
        if registry.contains_key(&request.session_id) {
            warn!(
                session_id = %request.session_id,
                kind = %request.kind,
                "run already active for session, refusing launch"
            );
            return false;
        }

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(
                    program = %request.program,
                    cwd = %request.cwd.display(),
                    %err,
                    "failed to spawn run process"
                );
                return false;
            }
        };

        // Dropping the child on this path reaps it via kill_on_drop.
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            warn!(session_id = %request.session_id, "spawned run is missing output pipes");
            return false;
        };

        let cancel = CancellationToken::new();
        registry.insert(
            request.session_id.clone(),
            ActiveRun {
                kind: request.kind,
                cancel: cancel.clone(),
            },
        );
        drop(registry);

        info!(
            session_id = %request.session_id,
            kind = %request.kind,
            program = %request.program,
            "run process started"
        );

        let registry = Arc::clone(&self.registry);
        tokio::spawn(supervise(
            request, child, stdout, stderr, events_tx, cancel, registry,
        ));
        true
    }

    fn is_running(&self, session_id: &str, kind: Option<RunKind>) -> bool {
        self.lock()
            .get(session_id)
            .is_some_and(|active| kind.is_none_or(|kind| active.kind == kind))
    }

    fn stop(&self, session_id: &str) -> bool {
        let registry = self.lock();
        if let Some(active) = registry.get(session_id) {
            active.cancel.cancel();
            true
        } else {
            false
        }
    }
}

// ── Supervision ─────────────────────────────────────────────────────────────

/// Drive one run to completion: echo the start, pump both output streams,
/// wait for exit or cancellation, then emit the final exit event.
async fn supervise(
    request: RunRequest,
    mut child: Child,
    stdout: impl AsyncRead + Unpin + Send + 'static,
    stderr: impl AsyncRead + Unpin + Send + 'static,
    events_tx: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
    registry: Arc<Mutex<HashMap<String, ActiveRun>>>,
) {
    let command = request.display_command();
    send_event(&events_tx, &request, RunEventPayload::Start { command }).await;

    let stdout_task = spawn_line_reader(stdout, OutputStream::Stdout, &request, &events_tx);
    let stderr_task = spawn_line_reader(stderr, OutputStream::Stderr, &request, &events_tx);

    let status = tokio::select! {
        status = child.wait() => status,
        () = cancel.cancelled() => {
            info!(session_id = %request.session_id, "stop requested, killing run process");
            if let Err(err) = child.start_kill() {
                warn!(session_id = %request.session_id, %err, "failed to kill run process");
            }
            child.wait().await
        }
    };

    // Drain remaining output before reporting the exit.
    stdout_task.await.ok();
    stderr_task.await.ok();

    // Free the session slot first so exit handlers can relaunch immediately.
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&request.session_id);

    let (code, signal) = match status {
        Ok(status) => (status.code(), signal_name(status)),
        Err(err) => {
            warn!(session_id = %request.session_id, %err, "failed to await run process");
            (None, None)
        }
    };
    info!(
        session_id = %request.session_id,
        kind = %request.kind,
        code = ?code,
        signal = ?signal,
        "run process exited"
    );
    send_event(&events_tx, &request, RunEventPayload::Exit { code, signal }).await;
}

/// Forward one output stream line by line until it closes.
fn spawn_line_reader(
    reader: impl AsyncRead + Unpin + Send + 'static,
    stream: OutputStream,
    request: &RunRequest,
    events_tx: &mpsc::Sender<RunEvent>,
) -> JoinHandle<()> {
    let session_id = request.session_id.clone();
    let kind = request.kind;
    let run_id = request.run_id.clone();
    let events_tx = events_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let payload = match stream {
                        OutputStream::Stdout => RunEventPayload::Stdout { line },
                        OutputStream::Stderr => RunEventPayload::Stderr { line },
                    };
                    let event = RunEvent {
                        session_id: session_id.clone(),
                        kind,
                        run_id: run_id.clone(),
                        at: Utc::now(),
                        payload,
                    };
                    if events_tx.send(event).await.is_err() {
                        debug!("run event channel closed, dropping output");
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(%session_id, %err, "failed to read run output");
                    return;
                }
            }
        }
    })
}

async fn send_event(
    events_tx: &mpsc::Sender<RunEvent>,
    request: &RunRequest,
    payload: RunEventPayload,
) {
    let event = RunEvent {
        session_id: request.session_id.clone(),
        kind: request.kind,
        run_id: request.run_id.clone(),
        at: Utc::now(),
        payload,
    };
    if events_tx.send(event).await.is_err() {
        debug!("run event channel closed, dropping event");
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|signal| match signal {
        2 => "SIGINT".to_owned(),
        9 => "SIGKILL".to_owned(),
        15 => "SIGTERM".to_owned(),
        other => format!("signal {other}"),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}
