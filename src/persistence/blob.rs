//! Storage backends for session records and the draft prompt.
//!
//! The store mutates in memory and writes through a [`BlobStore`] before
//! returning, so a crash never loses an acknowledged mutation. Backends are
//! deliberately dumb: whole-record put/remove plus a single draft slot.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::models::session::Session;
use crate::{AppError, Result};

/// Durable storage for session records and the new-session draft.
pub trait BlobStore {
    /// Load every stored session record, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend cannot be enumerated.
    fn load_all(&self) -> Result<Vec<Session>>;

    /// Write one session record, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the record cannot be written.
    fn put(&self, session: &Session) -> Result<()>;

    /// Remove one session record; absent records are not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend fails to delete.
    fn remove(&self, session_id: &str) -> Result<()>;

    /// Load the persisted new-session draft, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the draft cannot be read.
    fn load_draft(&self) -> Result<Option<String>>;

    /// Persist the new-session draft.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the draft cannot be written.
    fn put_draft(&self, draft: &str) -> Result<()>;
}

/// A shared backend handle is itself a backend, so a caller can keep one
/// side while the store owns the other.
impl<B: BlobStore> BlobStore for Arc<B> {
    fn load_all(&self) -> Result<Vec<Session>> {
        (**self).load_all()
    }

    fn put(&self, session: &Session) -> Result<()> {
        (**self).put(session)
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        (**self).remove(session_id)
    }

    fn load_draft(&self) -> Result<Option<String>> {
        (**self).load_draft()
    }

    fn put_draft(&self, draft: &str) -> Result<()> {
        (**self).put_draft(draft)
    }
}

/// File-per-session JSON backend rooted at a state directory.
///
/// Layout: `<root>/sessions/<id>.json` plus `<root>/draft.json`.
pub struct JsonDirStore {
    sessions_dir: PathBuf,
    draft_path: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if needed) a store rooted at `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the directory cannot be created.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let sessions_dir = state_dir.join("sessions");
        fs::create_dir_all(&sessions_dir).map_err(|err| {
            AppError::Store(format!(
                "failed to create {}: {err}",
                sessions_dir.display()
            ))
        })?;
        Ok(Self {
            sessions_dir,
            draft_path: state_dir.join("draft.json"),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }
}

impl BlobStore for JsonDirStore {
    fn load_all(&self) -> Result<Vec<Session>> {
        let entries = fs::read_dir(&self.sessions_dir).map_err(|err| {
            AppError::Store(format!("failed to list {}: {err}", self.sessions_dir.display()))
        })?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                AppError::Store(format!("failed to read directory entry: {err}"))
            })?;
            let path = entry.path();
            if path.extension().and_then(OsStr::to_str) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|err| {
                AppError::Store(format!("failed to read {}: {err}", path.display()))
            })?;
            // An unreadable record is skipped rather than poisoning startup.
            match serde_json::from_str::<Session>(&raw) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping corrupt session record");
                }
            }
        }
        Ok(sessions)
    }

    fn put(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id);
        let raw = serde_json::to_string_pretty(session)?;
        fs::write(&path, raw)
            .map_err(|err| AppError::Store(format!("failed to write {}: {err}", path.display())))
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Store(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }

    fn load_draft(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.draft_path) {
            Ok(raw) => {
                let draft: String = serde_json::from_str(&raw)?;
                Ok(Some(draft))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Store(format!(
                "failed to read {}: {err}",
                self.draft_path.display()
            ))),
        }
    }

    fn put_draft(&self, draft: &str) -> Result<()> {
        let raw = serde_json::to_string(draft)?;
        fs::write(&self.draft_path, raw).map_err(|err| {
            AppError::Store(format!(
                "failed to write {}: {err}",
                self.draft_path.display()
            ))
        })
    }
}

#[derive(Default)]
struct MemoryInner {
    sessions: HashMap<String, Session>,
    draft: Option<String>,
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Construct an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlobStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Session>> {
        Ok(self.lock().sessions.values().cloned().collect())
    }

    fn put(&self, session: &Session) -> Result<()> {
        self.lock()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        self.lock().sessions.remove(session_id);
        Ok(())
    }

    fn load_draft(&self) -> Result<Option<String>> {
        Ok(self.lock().draft.clone())
    }

    fn put_draft(&self, draft: &str) -> Result<()> {
        self.lock().draft = Some(draft.to_owned());
        Ok(())
    }
}
