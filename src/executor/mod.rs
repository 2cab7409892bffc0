//! Run execution: launching agent processes and streaming their output.

pub mod process;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::agent::RunRequest;
use crate::models::run::RunKind;

/// Queue depth for run events before output readers stall on backpressure.
pub const RUN_EVENT_QUEUE_CAPACITY: usize = 256;

/// Create the run event channel pair.
#[must_use]
pub fn channel() -> (mpsc::Sender<RunEvent>, mpsc::Receiver<RunEvent>) {
    mpsc::channel(RUN_EVENT_QUEUE_CAPACITY)
}

/// What happened inside a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEventPayload {
    /// The process launched.
    Start {
        /// Human-readable command line, for the log echo.
        command: String,
    },
    /// One line of standard output.
    Stdout {
        /// The line, without its terminator.
        line: String,
    },
    /// One line of standard error.
    Stderr {
        /// The line, without its terminator.
        line: String,
    },
    /// The process finished.
    Exit {
        /// Exit code; absent when the process died to a signal.
        code: Option<i32>,
        /// Signal name when the process died to one.
        signal: Option<String>,
    },
}

/// One event emitted by an active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    /// Owning session.
    pub session_id: String,
    /// Which run slot emitted this.
    pub kind: RunKind,
    /// Refine run record identifier, for refine runs.
    pub run_id: Option<String>,
    /// When the event was observed.
    pub at: DateTime<Utc>,
    /// What happened.
    pub payload: RunEventPayload,
}

/// Launches runs and tracks which sessions have one active.
///
/// Implementations enforce at most one active run per session; the launch
/// and bookkeeping calls are synchronous, while run output flows back
/// asynchronously through the event channel handed to [`RunExecutor::run`].
pub trait RunExecutor {
    /// Launch a run; returns whether the process actually started.
    ///
    /// All lifecycle events for the run are delivered on `events_tx`,
    /// starting with [`RunEventPayload::Start`] and ending with exactly one
    /// [`RunEventPayload::Exit`] after all output lines.
    fn run(&self, request: RunRequest, events_tx: mpsc::Sender<RunEvent>) -> bool;

    /// Whether the session has an active run, optionally of one kind.
    fn is_running(&self, session_id: &str, kind: Option<RunKind>) -> bool;

    /// Request termination of the session's active run; returns whether a
    /// process was found to signal.
    fn stop(&self, session_id: &str) -> bool;
}
