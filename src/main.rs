#![forbid(unsafe_code)]

//! `agent-workbench` — session orchestration engine binary.
//!
//! Speaks newline-delimited JSON over stdio: intents arrive on stdin, UI
//! messages leave on stdout. All session state lives under the workspace's
//! state directory and survives restarts.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_workbench::executor::process::ProcessExecutor;
use agent_workbench::orchestrator::engine::Engine;
use agent_workbench::orchestrator::intent::Intent;
use agent_workbench::persistence::blob::JsonDirStore;
use agent_workbench::persistence::store::SessionStore;
use agent_workbench::tracker::GhIssueTracker;
use agent_workbench::{executor, ui, AppConfig, AppError, Result};

/// Queue depth for decoded intents awaiting the engine.
const INTENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-workbench", about = "Session orchestration engine", version, long_about = None)]
struct Cli {
    /// Workspace root the sessions operate against.
    workspace: Option<PathBuf>,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the session state directory.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-workbench engine bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = if let Some(path) = &args.config {
        AppConfig::load_from_path(path)?
    } else {
        let workspace = args.workspace.clone().ok_or_else(|| {
            AppError::Config("workspace path required when no config file is given".into())
        })?;
        let mut config = AppConfig::new(workspace);
        config.validate()?;
        config
    };

    // Override workspace root from CLI if provided.
    if let Some(workspace) = args.workspace {
        let canonical = workspace
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.workspace_root = canonical;
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = Some(state_dir);
    }
    info!(workspace_root = %config.workspace_root.display(), "configuration loaded");

    // ── Open the session store ──────────────────────────
    let state_dir = config.state_dir();
    let blob = JsonDirStore::open(&state_dir)?;
    let store = SessionStore::open(blob)?;
    info!(state_dir = %state_dir.display(), sessions = store.sessions().len(), "session store opened");

    // ── Wire channels and the engine ────────────────────
    let (ui_tx, mut ui_rx) = ui::channel();
    let (events_tx, events_rx) = executor::channel();
    let (intents_tx, intents_rx) = mpsc::channel::<Intent>(INTENT_QUEUE_CAPACITY);

    let executor = ProcessExecutor::new();
    let tracker = GhIssueTracker::new(&config.tracker);
    let engine = Engine::new(config, store, executor, tracker, ui_tx, events_tx);

    // ── Stdio transport ─────────────────────────────────
    let writer_handle = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = ui_rx.recv().await {
            let encoded = match serde_json::to_string(&message) {
                Ok(encoded) => encoded,
                Err(err) => {
                    error!(%err, "failed to encode ui message");
                    continue;
                }
            };
            if stdout.write_all(encoded.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                warn!("stdout closed, stopping ui writer");
                return;
            }
        }
    });

    let reader_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Intent>(line) {
                        Ok(intent) => {
                            if intents_tx.send(intent).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => warn!(%err, "discarding malformed intent"),
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    return;
                }
                Err(err) => {
                    error!(%err, "stdin read failed");
                    return;
                }
            }
        }
    });

    // ── Run until stdin closes or a shutdown signal lands ──
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    engine.run(intents_rx, events_rx, shutdown).await;

    // The engine owned the only ui sender, so the writer drains and stops.
    writer_handle.await.ok();
    reader_handle.abort();
    info!("agent-workbench shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries the UI message stream; logs go to stderr.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
