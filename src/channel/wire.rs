//! Control-channel line grammar shared by the worker and supervisor sides.
//!
//! Every protocol line is UTF-8 and `\n`-terminated on the wire; the
//! constructors here return the line *without* its terminator, matching what
//! [`LineCodec`](super::codec::LineCodec) yields on decode.

use serde::Serialize;

/// Protocol version spoken by this crate. Must match the supervisor exactly.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Prefix marking adapter→supervisor control lines.
pub const CONTROL_PREFIX: &str = "!> ";

/// First line of the readiness block.
pub const READY_LINE: &str = "!> Ready";

/// Terminator line of the readiness block (prefix with nothing after it).
pub const END_LINE: &str = "!> ";

/// Greeting emitted by the adapter immediately on start.
#[must_use]
pub fn greeting() -> String {
    format!("{CONTROL_PREFIX}I have control {PROTOCOL_VERSION}")
}

/// Header ack the supervisor must reply with, version included.
#[must_use]
pub fn header_ack() -> String {
    format!("You have control {PROTOCOL_VERSION}")
}

/// Readiness announcement for a bound listener socket.
#[must_use]
pub fn socket_announcement(path: &str) -> String {
    format!("{CONTROL_PREFIX}socket: main;unix:{path};http_session;0")
}

/// Parsed form of a [`socket_announcement`] line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketAnnouncement {
    /// Listener name; the main application socket is `main`.
    pub name: String,
    /// Filesystem path of the bound socket.
    pub socket_path: String,
    /// Session protocol spoken over the socket.
    pub protocol: String,
    /// Advertised concurrency; `0` means unbounded.
    pub concurrency: u32,
}

/// Parse a `!> socket: name;unix:path;protocol;concurrency` line.
///
/// Returns `None` when the line is not a well-formed socket announcement.
#[must_use]
pub fn parse_socket_announcement(line: &str) -> Option<SocketAnnouncement> {
    let rest = line.strip_prefix(CONTROL_PREFIX)?.strip_prefix("socket: ")?;
    let mut fields = rest.split(';');
    let name = fields.next()?;
    let address = fields.next()?;
    let protocol = fields.next()?;
    let concurrency = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    let socket_path = address.strip_prefix("unix:")?;
    Some(SocketAnnouncement {
        name: name.to_owned(),
        socket_path: socket_path.to_owned(),
        protocol: protocol.to_owned(),
        concurrency,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
