//! Supervisor-side handshake driver.
//!
//! After the worker has greeted (see [`spawn_worker`](super::spawner::spawn_worker)),
//! the supervisor:
//!
//! 1. **`send_header_and_options`** — acknowledges control by writing the
//!    header line, one option line per key/value pair, and the empty
//!    terminator line.
//! 2. **`read_readiness`** — reads stdout lines until the readiness block
//!    completes, returning the parsed socket announcement.
//!
//! Both functions are generic over the stream halves so tests can drive
//! them through in-memory pipes against the adapter side of the protocol.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::channel::wire;
use crate::channel::wire::SocketAnnouncement;
use crate::{AppError, Result};

/// Write the header ack and option block to the worker's stdin.
///
/// Options are written in iteration order; the worker resolves duplicate
/// keys last-write-wins.
///
/// # Errors
///
/// Returns [`AppError::Supervisor`] when a write fails (e.g. the worker has
/// exited).
pub async fn send_header_and_options<W>(
    stdin: &mut W,
    options: &[(String, String)],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut block = String::new();
    block.push_str(&wire::header_ack());
    block.push('\n');
    for (key, value) in options {
        block.push_str(key);
        block.push_str(": ");
        block.push_str(value);
        block.push('\n');
    }
    block.push('\n');

    stdin
        .write_all(block.as_bytes())
        .await
        .map_err(|e| AppError::Supervisor(format!("failed to send startup options: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| AppError::Supervisor(format!("failed to flush startup options: {e}")))?;

    debug!(options = options.len(), "header and options sent");
    Ok(())
}

/// Read the worker's readiness block.
///
/// Reads lines one at a time until the end marker. The block must contain
/// the ready line and exactly one socket announcement; unrelated lines are
/// skipped with a debug log.
///
/// # Errors
///
/// - `AppError::Supervisor("readiness timeout …")` — block not complete
///   within `timeout`.
/// - `AppError::Supervisor("worker exited during startup")` — EOF before
///   the end marker.
/// - `AppError::Supervisor("malformed socket announcement: …")` — a
///   `socket:` control line that does not parse.
/// - `AppError::Supervisor("readiness block missing …")` — end marker seen
///   before the ready line or the announcement.
pub async fn read_readiness<R>(stdout: &mut R, timeout: Duration) -> Result<SocketAnnouncement>
where
    R: AsyncBufRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut ready_seen = false;
    let mut announcement: Option<SocketAnnouncement> = None;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(AppError::Supervisor(format!(
                "readiness timeout: report not received within {timeout:?}"
            )));
        }

        let mut raw = String::new();
        let n = tokio::time::timeout(remaining, stdout.read_line(&mut raw))
            .await
            .map_err(|_| {
                AppError::Supervisor(format!(
                    "readiness timeout: report not received within {timeout:?}"
                ))
            })?
            .map_err(|e| AppError::Supervisor(format!("readiness read error: {e}")))?;

        if n == 0 {
            return Err(AppError::Supervisor("worker exited during startup".into()));
        }

        let line = raw.trim_end_matches(['\n', '\r']);

        if line == wire::READY_LINE {
            ready_seen = true;
            continue;
        }

        if line == wire::END_LINE {
            let Some(report) = announcement else {
                return Err(AppError::Supervisor(
                    "readiness block missing socket announcement".into(),
                ));
            };
            if !ready_seen {
                return Err(AppError::Supervisor(
                    "readiness block missing ready line".into(),
                ));
            }
            info!(socket_path = %report.socket_path, "worker ready");
            return Ok(report);
        }

        if line.starts_with(wire::CONTROL_PREFIX) && line.contains("socket:") {
            let parsed = wire::parse_socket_announcement(line).ok_or_else(|| {
                AppError::Supervisor(format!("malformed socket announcement: {line:?}"))
            })?;
            announcement = Some(parsed);
            continue;
        }

        debug!(line, "skipping unexpected line before readiness block end");
    }
}
