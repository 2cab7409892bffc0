//! Workspace path resolution.
//!
//! Runs execute inside a working tree, not the workspace root itself. The
//! preferred layout is a meta-repo with worktrees under `trees/`, where
//! `trees/main` is the shared planning tree; a workspace that is itself a
//! single worktree is accepted as a fallback.

use std::env;
use std::path::{Path, PathBuf};

/// Resolve the directory runs execute in, if the workspace supports runs.
pub fn resolve_run_cwd(workspace_root: &Path) -> Option<PathBuf> {
    let shared = workspace_root.join("trees").join("main");
    if shared.exists() {
        return Some(shared);
    }
    if looks_like_worktree_root(workspace_root) {
        return Some(workspace_root.to_path_buf());
    }
    None
}

/// Cheap shape check for a single opened worktree: the setup script, the
/// Makefile, and the CLI sources all present.
fn looks_like_worktree_root(root: &Path) -> bool {
    root.join("setup.sh").exists() && root.join("Makefile").exists() && root.join("src").exists()
}

/// Resolve a user-visible file reference to an openable path.
///
/// `~/` expands against the home directory. Relative paths are tried against
/// the workspace root first, then the run directory; the first existing
/// candidate wins, falling back to the workspace-rooted guess.
pub fn resolve_local_file(
    workspace_root: &Path,
    run_cwd: Option<&Path>,
    raw_path: &str,
) -> PathBuf {
    let normalized = normalize_home(raw_path);
    if normalized.is_absolute() {
        return normalized;
    }

    let mut candidates = vec![workspace_root.join(&normalized)];
    if let Some(run_cwd) = run_cwd {
        if run_cwd != workspace_root {
            candidates.push(run_cwd.join(&normalized));
        }
    }
    candidates
        .iter()
        .find(|candidate| candidate.exists())
        .cloned()
        .unwrap_or_else(|| candidates.remove(0))
}

fn normalize_home(raw_path: &str) -> PathBuf {
    if let Some(rest) = raw_path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw_path)
}

/// Home directory from the environment, `HOME` first then `USERPROFILE`.
pub(crate) fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}
