//! Application configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// External agent CLI settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary invoked for plan, implement, and refine runs.
    #[serde(default = "default_agent_program")]
    pub program: String,
    /// Arguments prepended before the run subcommand.
    #[serde(default)]
    pub base_args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            base_args: Vec::new(),
        }
    }
}

/// Issue-tracker CLI settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Tracker CLI binary used for issue-state and issue-URL queries.
    #[serde(default = "default_tracker_program")]
    pub program: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            program: default_tracker_program(),
        }
    }
}

fn default_agent_program() -> String {
    "acw".into()
}

fn default_tracker_program() -> String {
    "gh".into()
}

/// Application configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    /// Workspace root the sessions operate against.
    pub workspace_root: PathBuf,
    /// Directory for persisted session records; derived from the workspace
    /// root when unset.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Agent CLI settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Issue-tracker CLI settings.
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl AppConfig {
    /// Construct a default configuration rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            state_dir: None,
            agent: AgentConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Directory holding persisted session records.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.workspace_root.join(".agent-workbench"))
    }

    /// Validate invariants and canonicalize the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the workspace root does not resolve or
    /// the agent program is empty.
    pub fn validate(&mut self) -> Result<()> {
        if self.agent.program.trim().is_empty() {
            return Err(AppError::Config("agent.program must not be empty".into()));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}
