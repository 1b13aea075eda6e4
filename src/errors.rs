//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Crate error enumeration covering all domain failure modes.
///
/// Bind conflicts (`EADDRINUSE`) are deliberately absent: the installer
/// consumes them inside its retry loop and only the exhaustion of that loop
/// is observable, as [`AppError::BindExhausted`]. Filesystem errors during
/// shutdown cleanup are likewise swallowed at the call site and never
/// constructed.
#[derive(Debug)]
pub enum AppError {
    /// Control-channel protocol violation: bad header ack, malformed option
    /// line, or premature end of stream. Fatal to the worker process.
    Protocol(String),
    /// A second managed-listener installation was attempted. Local to the
    /// listen call; existing state is untouched.
    Install(String),
    /// The bind-retry loop ran out of attempts without finding a free
    /// socket path. Fatal to the installation attempt, not to the process.
    BindExhausted(String),
    /// Supervisor-side failure: worker spawn, startup timeout, or a
    /// malformed readiness report.
    Supervisor(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Install(msg) => write!(f, "install: {msg}"),
            Self::BindExhausted(msg) => write!(f, "bind exhausted: {msg}"),
            Self::Supervisor(msg) => write!(f, "supervisor: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

// Required by the line codec: `tokio_util::codec::Decoder` errors must be
// constructible from raw stream failures.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
