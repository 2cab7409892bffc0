//! Backend resolution from workspace-local settings files.
//!
//! Runs pick their model backend from the first `.agentize.local.yaml` found
//! in the run directory, then `$AGENTIZE_HOME`, then the home directory. The
//! file is YAML but only one nested key matters, so it is scanned line by
//! line rather than parsed; invalid or unreadable candidates are skipped.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::workspace::resolve_home_dir;

const SETTINGS_FILE: &str = ".agentize.local.yaml";

/// Resolve the backend spec to launch a run with, if any candidate file
/// names a valid one.
pub fn resolve_backend_for_run(run_root: &Path) -> Option<String> {
    for candidate in search_paths(run_root) {
        if !candidate.exists() {
            continue;
        }
        match fs::read_to_string(&candidate) {
            Ok(content) => {
                let Some(backend) = extract_planner_backend(&content) else {
                    continue;
                };
                if is_valid_backend_spec(&backend) {
                    return Some(backend);
                }
                warn!(path = %candidate.display(), "invalid backend spec, ignoring");
            }
            Err(err) => {
                warn!(path = %candidate.display(), %err, "failed to read settings file");
            }
        }
    }
    None
}

/// Ordered settings-file candidates for a run rooted at `run_root`.
fn search_paths(run_root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![run_root.join(SETTINGS_FILE)];
    if let Some(home) = env::var("AGENTIZE_HOME")
        .ok()
        .filter(|value| !value.is_empty())
    {
        if Path::new(&home) != run_root {
            candidates.push(Path::new(&home).join(SETTINGS_FILE));
        }
    }
    if let Some(home_dir) = resolve_home_dir() {
        candidates.push(home_dir.join(SETTINGS_FILE));
    }
    candidates
}

/// Pull `planner.backend` out of a settings document.
///
/// Scans for a top-level-relative `planner:` header, then for a more-deeply
/// indented `backend:` entry under it. Blank and comment lines never
/// terminate the block; a line indented at or above the header does.
pub fn extract_planner_backend(content: &str) -> Option<String> {
    let mut in_planner = false;
    let mut planner_indent = 0;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if !in_planner {
            if is_planner_header(trimmed) {
                in_planner = true;
                planner_indent = indent;
            }
            continue;
        }

        if indent <= planner_indent {
            in_planner = false;
            continue;
        }

        if let Some(value) = backend_value(trimmed) {
            return Some(strip_quotes(&value));
        }
    }
    None
}

/// A `planner:` mapping header, optionally with a trailing comment.
fn is_planner_header(trimmed: &str) -> bool {
    let Some(rest) = trimmed.strip_prefix("planner") else {
        return false;
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix(':') else {
        return false;
    };
    let rest = rest.trim();
    rest.is_empty() || rest.starts_with('#')
}

/// The value of a `backend:` entry, with any trailing comment removed.
fn backend_value(trimmed: &str) -> Option<String> {
    let rest = trimmed.strip_prefix("backend")?.trim_start();
    let rest = rest.strip_prefix(':')?;
    let value = rest.find('#').map_or(rest, |pos| &rest[..pos]);
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_owned())
}

fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2);
    if quoted {
        trimmed[1..trimmed.len() - 1].to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Whether a backend spec is `provider:model` with no whitespace in either
/// half.
#[must_use]
pub fn is_valid_backend_spec(spec: &str) -> bool {
    let trimmed = spec.trim();
    let Some(separator) = trimmed.find(':') else {
        return false;
    };
    if separator == 0 || separator >= trimmed.len() - 1 {
        return false;
    }
    let provider = &trimmed[..separator];
    let model = &trimmed[separator + 1..];
    !provider.chars().any(char::is_whitespace) && !model.chars().any(char::is_whitespace)
}
