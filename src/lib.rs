#![forbid(unsafe_code)]

//! `stagehand` — supervised worker adapter runtime.
//!
//! A worker process embeds this crate to speak a line-based startup
//! handshake with its supervisor over standard streams, receive its
//! configuration, and have its first listener transparently installed onto
//! a supervisor-chosen local socket. The crate also carries the supervisor
//! side of the wire protocol as a verification harness.

pub mod channel;
pub mod config;
pub mod errors;
pub mod installer;
pub mod options;
pub mod runtime;
pub mod shutdown;
pub mod supervisor;

pub use errors::{AppError, Result};
pub use installer::{ListenTarget, ManagedListener, ManagedStream};
pub use options::OptionsTable;
pub use runtime::{AdapterConfig, AppContext, Runtime};
pub use shutdown::ShutdownOutcome;
