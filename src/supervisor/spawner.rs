//! Worker process spawner for the supervisor side.
//!
//! Spawns adapter worker processes with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist so nothing from the
//!   supervisor's environment leaks into the worker beyond the basics.
//! - A configurable startup timeout: if the worker does not emit its
//!   greeting (first stdout line) within the window, the process is killed
//!   and [`AppError::Supervisor`] is returned.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::channel::wire;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned worker process.
///
/// Every other variable from the supervisor's environment is stripped via
/// `env_clear()` before the child is launched.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "TMPDIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for spawning an adapter worker process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Worker binary or interpreter to execute.
    pub command: String,
    /// Arguments passed to the worker command.
    pub args: Vec<String>,
    /// Working directory for the worker; inherited when `None`.
    pub workspace_root: Option<PathBuf>,
    /// Maximum time to wait for the worker's greeting (first stdout line).
    pub startup_timeout: Duration,
}

// ── Connection handle ────────────────────────────────────────────────────────

/// Active stdio connection to a spawned worker that has already greeted.
///
/// The caller is responsible for keeping `child` alive (it has
/// `kill_on_drop(true)`), writing the header and option block to `stdin`,
/// and reading the readiness report from `stdout`.
#[derive(Debug)]
pub struct WorkerConnection {
    /// Child process handle.
    pub child: Child,
    /// Worker's stdin, the supervisor→adapter direction.
    pub stdin: ChildStdin,
    /// Buffered reader over the worker's stdout, positioned after the
    /// greeting line.
    pub stdout: BufReader<ChildStdout>,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn a worker process and wait for its protocol greeting.
///
/// The first stdout line doubles as the worker's ready signal and is
/// verified against the expected greeting, version included. On timeout or
/// a wrong greeting the process is killed before the error is returned.
///
/// # Errors
///
/// - `AppError::Supervisor("failed to spawn worker: …")` — OS spawn failure.
/// - `AppError::Supervisor("startup timeout …")` — no greeting within the window.
/// - `AppError::Supervisor("worker exited before greeting")` — early EOF.
/// - `AppError::Supervisor("unexpected greeting …")` — wrong line or version.
pub async fn spawn_worker(config: &SpawnConfig) -> Result<WorkerConnection> {
    let mut cmd = Command::new(&config.command);

    for arg in &config.args {
        cmd.arg(arg);
    }

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    if let Some(ref dir) = config.workspace_root {
        cmd.current_dir(dir);
    }

    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Supervisor(format!("failed to spawn worker: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Supervisor("failed to capture worker stdin".into()))?;
    let stdout_raw = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Supervisor("failed to capture worker stdout".into()))?;

    let mut reader = BufReader::new(stdout_raw);
    let mut line = String::new();

    match tokio::time::timeout(config.startup_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {
            let greeting = line.trim_end_matches(['\n', '\r']);
            if greeting != wire::greeting() {
                child.kill().await.ok();
                return Err(AppError::Supervisor(format!(
                    "unexpected greeting from worker: {greeting:?}"
                )));
            }
            info!(command = %config.command, "worker greeted");
        }
        Ok(Ok(_)) => {
            // n == 0 means EOF — the process exited before saying anything.
            return Err(AppError::Supervisor("worker exited before greeting".into()));
        }
        Ok(Err(err)) => {
            return Err(AppError::Supervisor(format!(
                "failed to read worker greeting: {err}"
            )));
        }
        Err(_elapsed) => {
            // Kill the process before returning the error.
            child.kill().await.ok();
            return Err(AppError::Supervisor(format!(
                "startup timeout: worker did not greet within {:?}",
                config.startup_timeout
            )));
        }
    }

    Ok(WorkerConnection {
        child,
        stdin,
        stdout: reader,
    })
}
