#![forbid(unsafe_code)]

//! `stagehand-probe` — supervisor-side CLI companion.
//!
//! Spawns a worker, drives the startup handshake, prints the readiness
//! report, then closes the control channel and waits for the worker to
//! exit. Useful for verifying that a worker binary speaks the protocol
//! correctly before putting it under a real supervisor.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use stagehand::config::ProbeConfig;
use stagehand::supervisor::{read_readiness, send_header_and_options, spawn_worker, SpawnConfig};
use stagehand::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stagehand-probe", about = "Handshake probe for adapter workers", version, long_about = None)]
struct Cli {
    /// Path to a TOML probe configuration file.
    ///
    /// Flags below override values from the file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker command to spawn (required unless set in the config file).
    #[arg(long)]
    command: Option<String>,

    /// Argument passed to the worker command; repeatable.
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Startup option as `key=value`; repeatable. Later duplicates win.
    #[arg(long = "option", value_parser = parse_key_value)]
    options: Vec<(String, String)>,

    /// Working directory for the worker.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Seconds to wait for the worker's greeting.
    #[arg(long)]
    startup_timeout: Option<u64>,

    /// Seconds to wait for the readiness report.
    #[arg(long)]
    readiness_timeout: Option<u64>,

    /// Print the readiness report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// Parse a `key=value` option flag.
fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let (spawn_config, options, readiness_timeout) = resolve(&args)?;

    info!(command = %spawn_config.command, "spawning worker");
    let mut conn = spawn_worker(&spawn_config).await?;

    send_header_and_options(&mut conn.stdin, &options).await?;
    let report = read_readiness(&mut conn.stdout, readiness_timeout).await?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| AppError::Supervisor(format!("failed to render report: {err}")))?;
        println!("{rendered}");
    } else {
        println!("worker ready");
        println!("  listener:    {}", report.name);
        println!("  socket path: {}", report.socket_path);
        println!("  protocol:    {}", report.protocol);
        println!("  concurrency: {}", report.concurrency);
    }

    // Closing our side of the channel asks the worker to shut down.
    drop(conn.stdin);
    match conn.child.wait().await {
        Ok(status) if status.success() => info!("worker exited cleanly"),
        Ok(status) => warn!(%status, "worker exited with failure"),
        Err(err) => warn!(%err, "failed to wait for worker exit"),
    }

    Ok(())
}

/// Merge the config file (when given) with command-line overrides.
fn resolve(args: &Cli) -> Result<(SpawnConfig, Vec<(String, String)>, Duration)> {
    let file = match args.config {
        Some(ref path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
            Some(ProbeConfig::from_toml_str(&text)?)
        }
        None => None,
    };

    let command = args
        .command
        .clone()
        .or_else(|| file.as_ref().map(|f| f.command.clone()))
        .ok_or_else(|| AppError::Config("no worker command: pass --command or --config".into()))?;

    let mut worker_args = file.as_ref().map(|f| f.args.clone()).unwrap_or_default();
    worker_args.extend(args.args.iter().cloned());

    let workspace_root = args
        .workspace
        .clone()
        .or_else(|| file.as_ref().and_then(|f| f.workspace_root.clone()));

    let startup_timeout = args
        .startup_timeout
        .map(Duration::from_secs)
        .or_else(|| file.as_ref().map(ProbeConfig::startup_timeout))
        .unwrap_or(Duration::from_secs(10));

    let readiness_timeout = args
        .readiness_timeout
        .map(Duration::from_secs)
        .or_else(|| file.as_ref().map(ProbeConfig::readiness_timeout))
        .unwrap_or(Duration::from_secs(30));

    // File options first, CLI options appended: the worker resolves
    // duplicates last-write-wins, so CLI flags override the file.
    let mut options: Vec<(String, String)> = file
        .as_ref()
        .map(|f| {
            f.options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    options.extend(args.options.iter().cloned());

    Ok((
        SpawnConfig {
            command,
            args: worker_args,
            workspace_root,
            startup_timeout,
        },
        options,
        readiness_timeout,
    ))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The report goes to stdout; keep logs on stderr so --json stays clean.
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
