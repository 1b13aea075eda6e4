#![forbid(unsafe_code)]

//! `stagehand-demo` — reference worker binary.
//!
//! Embeds the adapter runtime and serves a trivial line-echo application
//! over the managed listener. Run it under `stagehand-probe` (or any
//! supervisor speaking the protocol); it is not meant to be started by
//! hand, since stdin/stdout carry the control channel.
//!
//! All log output goes to stderr — stdout belongs to the protocol.

use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use stagehand::{
    AppError, ListenTarget, ManagedListener, ManagedStream, Result, Runtime, ShutdownOutcome,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stagehand-demo", about = "Line-echo worker for the adapter protocol", version, long_about = None)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("stagehand-demo worker starting");

    // The adapter core is cooperative and single-threaded.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run())
}

async fn run() -> Result<()> {
    let outcome = Runtime::run(|ctx| async move {
        let startup_path = ctx.startup_path().await;
        info!(startup_path = %startup_path.display(), "demo application loaded");

        let listener = ctx
            .listen_with(
                ListenTarget::Managed,
                Box::new(|listener: &ManagedListener| {
                    info!(socket_path = listener.socket_path(), "echo server listening");
                }),
            )
            .await?;

        tokio::spawn(serve(listener));
        Ok(())
    })
    .await?;

    match outcome {
        ShutdownOutcome::Exit | ShutdownOutcome::Notified => {
            info!("supervisor closed the channel, exiting");
            Ok(())
        }
    }
}

/// Accept loop for the echo application.
async fn serve(listener: ManagedListener) {
    loop {
        match listener.accept().await {
            Ok(stream) => {
                debug!(peer = %stream.peer_addr(), "connection accepted");
                tokio::spawn(echo(stream));
            }
            Err(err) => {
                warn!(%err, "accept failed, stopping echo server");
                break;
            }
        }
    }
}

/// Echo lines back to the peer until it hangs up.
async fn echo(stream: ManagedStream) {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match lines.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Err(err) = writer.write_all(line.as_bytes()).await {
                    warn!(%err, "echo write failed");
                    break;
                }
            }
            Err(err) => {
                warn!(%err, "echo read failed");
                break;
            }
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the control channel; logs must stay on stderr.
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
