//! UI transport: typed messages pushed to the host surface.
//!
//! The engine never talks to a rendering surface directly; it posts
//! [`UiMessage`] values through a bounded channel and the binary forwards
//! them as JSON lines. Message tags keep their protocol names so a surface
//! can dispatch on the `type` field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::session::Session;
use crate::models::widget::{ActionButton, ProgressEvent, Widget, WidgetMeta};

/// Backpressure bound for the UI queue.
const UI_QUEUE_CAPACITY: usize = 256;

/// In-place mutation of one widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WidgetDelta {
    /// Append lines to a terminal widget.
    AppendLines {
        /// Lines in append order.
        lines: Vec<String>,
    },
    /// Append markers to a progress widget.
    AppendEvents {
        /// Markers in append order.
        events: Vec<ProgressEvent>,
    },
    /// Replace the buttons of a button-row widget.
    ReplaceButtons {
        /// The full new button set.
        buttons: Vec<ActionButton>,
    },
    /// Mark a progress widget finished.
    Complete,
    /// Merge a metadata patch into the widget.
    Metadata {
        /// Fields to overwrite; unset fields keep their value.
        metadata: WidgetMeta,
    },
}

/// One message pushed to the host surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum UiMessage {
    /// Full state snapshot; replaces everything the surface holds.
    #[serde(rename = "state/replace")]
    StateReplace {
        /// Every session, newest-created first.
        sessions: Vec<Session>,
        /// The persisted new-session draft.
        draft: String,
    },
    /// One session changed or was deleted.
    #[serde(rename = "plan/sessionUpdated")]
    SessionUpdated {
        /// Which session.
        session_id: String,
        /// The full new record, absent when deleted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Box<Session>>,
        /// Set when the session was deleted.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        deleted: bool,
    },
    /// A widget was added to a session.
    #[serde(rename = "widget/append")]
    WidgetAppend {
        /// Owning session.
        session_id: String,
        /// The full new widget.
        widget: Widget,
    },
    /// An existing widget changed in place.
    #[serde(rename = "widget/update")]
    WidgetUpdate {
        /// Owning session.
        session_id: String,
        /// Which widget.
        widget_id: String,
        /// What changed.
        update: WidgetDelta,
    },
    /// Ask the host to open a local file in its editor.
    #[serde(rename = "nav/openFile")]
    OpenFile {
        /// Resolved path to open.
        path: PathBuf,
    },
    /// Ask the host to open an external URL.
    #[serde(rename = "nav/openExternal")]
    OpenExternal {
        /// Validated URL to open.
        url: String,
    },
}

/// Posting half of the UI channel.
#[derive(Clone)]
pub struct UiSender {
    tx: mpsc::Sender<UiMessage>,
}

/// Create the UI channel pair.
#[must_use]
pub fn channel() -> (UiSender, mpsc::Receiver<UiMessage>) {
    let (tx, rx) = mpsc::channel(UI_QUEUE_CAPACITY);
    (UiSender { tx }, rx)
}

impl UiSender {
    /// Post one message, logging if the surface has gone away.
    pub async fn post(&self, message: UiMessage) {
        if self.tx.send(message).await.is_err() {
            debug!("ui channel closed, dropping message");
        }
    }

    /// Post a full session snapshot.
    pub async fn session_updated(&self, session: &Session) {
        self.post(UiMessage::SessionUpdated {
            session_id: session.id.clone(),
            session: Some(Box::new(session.clone())),
            deleted: false,
        })
        .await;
    }

    /// Post a session deletion.
    pub async fn session_deleted(&self, session_id: &str) {
        self.post(UiMessage::SessionUpdated {
            session_id: session_id.to_owned(),
            session: None,
            deleted: true,
        })
        .await;
    }

    /// Post a newly created widget.
    pub async fn widget_append(&self, session_id: &str, widget: Widget) {
        self.post(UiMessage::WidgetAppend {
            session_id: session_id.to_owned(),
            widget,
        })
        .await;
    }

    /// Post an in-place widget change.
    pub async fn widget_update(&self, session_id: &str, widget_id: &str, update: WidgetDelta) {
        self.post(UiMessage::WidgetUpdate {
            session_id: session_id.to_owned(),
            widget_id: widget_id.to_owned(),
            update,
        })
        .await;
    }

    /// Post the full state snapshot.
    pub async fn state_replace(&self, sessions: Vec<Session>, draft: String) {
        self.post(UiMessage::StateReplace { sessions, draft }).await;
    }

    /// Ask the host to open a local file.
    pub async fn open_file(&self, path: PathBuf) {
        self.post(UiMessage::OpenFile { path }).await;
    }

    /// Ask the host to open an external URL.
    pub async fn open_external(&self, url: String) {
        self.post(UiMessage::OpenExternal { url }).await;
    }
}
