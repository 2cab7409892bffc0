//! Agent CLI command construction.
//!
//! Runs launch the configured agent binary with a per-kind subcommand. The
//! argument vector is handed to the process spawner verbatim; quoting only
//! happens for the human-readable echo line.

use std::path::PathBuf;

use crate::config::AgentConfig;
use crate::models::run::RunKind;

/// Kind-specific launch inputs.
#[derive(Debug, Clone)]
pub enum RunParams<'a> {
    /// Plan from the session prompt.
    Plan {
        /// Prompt text passed to the planner.
        prompt: &'a str,
    },
    /// Implement against a tracking issue.
    Implement {
        /// Issue number to implement.
        issue: &'a str,
    },
    /// Refine against a tracking issue with a focus instruction.
    Refine {
        /// Issue number to refine against.
        issue: &'a str,
        /// Focus text for this pass.
        focus: &'a str,
        /// Identifier of the refine run record.
        run_id: &'a str,
    },
}

impl RunParams<'_> {
    /// The run kind these parameters launch.
    #[must_use]
    pub fn kind(&self) -> RunKind {
        match self {
            Self::Plan { .. } => RunKind::Plan,
            Self::Implement { .. } => RunKind::Implement,
            Self::Refine { .. } => RunKind::Refine,
        }
    }
}

/// Everything the executor needs to launch one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Owning session.
    pub session_id: String,
    /// Which run slot this occupies.
    pub kind: RunKind,
    /// Refine run record identifier, for refine runs.
    pub run_id: Option<String>,
    /// Directory the process runs in.
    pub cwd: PathBuf,
    /// Binary to launch.
    pub program: String,
    /// Arguments, in order, unquoted.
    pub args: Vec<String>,
}

impl RunRequest {
    /// One-line rendering used for the command echo in run logs.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut rendered = vec![self.program.clone()];
        rendered.extend(self.args.iter().map(|arg| quote_for_display(arg)));
        rendered.join(" ")
    }
}

/// Assemble the launch request for one run.
#[must_use]
pub fn build_request(
    agent: &AgentConfig,
    session_id: &str,
    cwd: PathBuf,
    params: &RunParams<'_>,
    backend: Option<&str>,
) -> RunRequest {
    let kind = params.kind();
    let mut args = agent.base_args.clone();
    args.push(kind.as_str().to_owned());

    let mut run_id = None;
    match params {
        RunParams::Plan { prompt } => {
            args.push("--prompt".into());
            args.push((*prompt).to_owned());
        }
        RunParams::Implement { issue } => {
            args.push("--issue".into());
            args.push((*issue).to_owned());
        }
        RunParams::Refine {
            issue,
            focus,
            run_id: id,
        } => {
            args.push("--issue".into());
            args.push((*issue).to_owned());
            args.push("--focus".into());
            args.push((*focus).to_owned());
            run_id = Some((*id).to_owned());
        }
    }
    if let Some(backend) = backend {
        args.push("--backend".into());
        args.push(backend.to_owned());
    }

    RunRequest {
        session_id: session_id.to_owned(),
        kind,
        run_id,
        cwd,
        program: agent.program.clone(),
        args,
    }
}

fn quote_for_display(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_owned()
    }
}
