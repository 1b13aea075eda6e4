//! Control-channel handling for the startup handshake.
//!
//! This module owns the line-oriented protocol the adapter speaks with its
//! supervisor over standard streams.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing
//!   with a line-length guard.
//! - `wire`: the shared line grammar (greeting, header ack, readiness block).
//! - `session`: the adapter-side [`HandshakeChannel`] state machine and the
//!   one-shot [`ReadinessReporter`].

pub mod codec;
pub mod session;
pub mod wire;

pub use session::{ChannelWriter, HandshakeChannel, HandshakeState, ReadinessReporter};
