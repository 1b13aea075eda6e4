//! Supervisor-side harness for the adapter protocol.
//!
//! The crate's core is the worker side of the handshake; this module is the
//! other end of the same wire format, used by the probe binary and by
//! integration tests to drive a worker end to end: spawn it, acknowledge
//! control, send options, and collect the readiness report.
//!
//! Submodules:
//! - `spawner`: process launch with environment isolation and a bounded
//!   wait for the greeting.
//! - `handshake`: header/options emission and readiness parsing.

pub mod handshake;
pub mod spawner;

pub use handshake::{read_readiness, send_header_and_options};
pub use spawner::{spawn_worker, SpawnConfig, WorkerConnection};
