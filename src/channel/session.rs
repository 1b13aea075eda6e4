//! Adapter-side handshake state machine and readiness emission.
//!
//! The handshake is a strict sequential line protocol over the worker's
//! standard streams:
//!
//! 1. **greeting** — the adapter writes `!> I have control <version>`.
//! 2. **header** — the supervisor must reply `You have control <version>`
//!    for the exact same version; anything else is fatal.
//! 3. **options** — `<key>: <value>` lines accumulate into an
//!    [`OptionsTable`] until an empty line terminates the block. Stream end
//!    before the terminator is fatal.
//!
//! After the options terminator the channel is split with
//! [`HandshakeChannel::into_parts`]: the read half moves to the shutdown
//! watch and the write half becomes the one-shot [`ReadinessReporter`].

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::channel::codec::LineCodec;
use crate::channel::wire;
use crate::options::OptionsTable;
use crate::{AppError, Result};

/// Handshake session phases, in protocol order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Channel created, greeting not yet written.
    Init,
    /// Greeting written, waiting for the supervisor's header ack.
    AwaitHeader,
    /// Header verified, accumulating option lines.
    ReadingOptions,
    /// Option block terminated; the application may be loaded.
    Ready,
    /// A managed listener has been installed.
    Installed,
    /// The control channel has closed and teardown has run.
    Terminated,
}

/// Line-oriented control channel over the worker's standard streams.
///
/// Generic over the stream halves so tests can drive the protocol through
/// [`tokio::io::duplex`] pipes instead of real stdio.
#[derive(Debug)]
pub struct HandshakeChannel<R, W> {
    reader: FramedRead<R, LineCodec>,
    writer: W,
    state: HandshakeState,
}

impl<R, W> HandshakeChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the given stream halves in a fresh handshake session.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, LineCodec::new()),
            writer,
            state: HandshakeState::Init,
        }
    }

    /// Current session phase.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the full handshake: greeting, header ack, option block.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] on a version mismatch, a malformed
    /// option line, or stream end before the options terminator; any of
    /// these is fatal to the worker process.
    pub async fn run(&mut self) -> Result<OptionsTable> {
        self.send_greeting().await?;
        self.read_header().await?;
        self.read_options().await
    }

    /// Emit the greeting line. Transitions `Init → AwaitHeader`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the write fails, or
    /// [`AppError::Protocol`] when called out of order.
    pub async fn send_greeting(&mut self) -> Result<()> {
        self.expect_state(HandshakeState::Init)?;
        write_line(&mut self.writer, &wire::greeting()).await?;
        self.state = HandshakeState::AwaitHeader;
        debug!("handshake: greeting sent");
        Ok(())
    }

    /// Read and verify the supervisor's header ack.
    /// Transitions `AwaitHeader → ReadingOptions`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the reply is missing or differs
    /// from `You have control <version>` for this crate's version.
    pub async fn read_header(&mut self) -> Result<()> {
        self.expect_state(HandshakeState::AwaitHeader)?;
        let line = self.next_line().await?.ok_or_else(|| {
            AppError::Protocol("end of stream while waiting for initialization header".into())
        })?;

        let expected = wire::header_ack();
        if line != expected {
            return Err(AppError::Protocol(format!(
                "invalid initialization header: expected {expected:?}, got {line:?}"
            )));
        }

        self.state = HandshakeState::ReadingOptions;
        debug!("handshake: header verified");
        Ok(())
    }

    /// Read `<key>: <value>` lines into an [`OptionsTable`] until the empty
    /// terminator line. Transitions `ReadingOptions → Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] on a malformed option line or when the
    /// stream ends before the terminator.
    pub async fn read_options(&mut self) -> Result<OptionsTable> {
        self.expect_state(HandshakeState::ReadingOptions)?;
        let mut table = OptionsTable::new();

        loop {
            let Some(line) = self.next_line().await? else {
                return Err(AppError::Protocol(
                    "end of stream encountered while reading startup options".into(),
                ));
            };

            if line.is_empty() {
                break;
            }

            table.insert_line(&line)?;
        }

        self.state = HandshakeState::Ready;
        info!(options = table.len(), "handshake complete");
        Ok(table)
    }

    /// Split the channel into its read and write halves.
    ///
    /// Intended to be called once the session is [`HandshakeState::Ready`]:
    /// the read half feeds the shutdown watch, the write half feeds the
    /// readiness reporter.
    #[must_use]
    pub fn into_parts(self) -> (FramedRead<R, LineCodec>, W) {
        (self.reader, self.writer)
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    /// Read the next line, or `None` at end of stream.
    async fn next_line(&mut self) -> Result<Option<String>> {
        match self.reader.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Guard against out-of-order protocol steps.
    fn expect_state(&self, expected: HandshakeState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::Protocol(format!(
                "handshake step out of order: in {:?}, expected {expected:?}",
                self.state
            )))
        }
    }
}

// ── Readiness reporting ───────────────────────────────────────────────────────

/// Write half of the control channel, erased so the reporter can be shared
/// without spreading stream type parameters through the context.
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One-shot emitter for the readiness block.
///
/// The block announces the bound socket to the supervisor:
///
/// ```text
/// !> Ready
/// !> socket: main;unix:<path>;http_session;0
/// !>
/// ```
///
/// Only the first [`report`](Self::report) call writes anything; later calls
/// are no-ops so the announcement can never be duplicated.
pub struct ReadinessReporter {
    writer: ChannelWriter,
    sent: bool,
}

impl std::fmt::Debug for ReadinessReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessReporter")
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl ReadinessReporter {
    /// Wrap the channel's write half.
    #[must_use]
    pub fn new(writer: ChannelWriter) -> Self {
        Self {
            writer,
            sent: false,
        }
    }

    /// Whether the readiness block has been written.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Emit the readiness block for `socket_path`, at most once.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when a write fails.
    pub async fn report(&mut self, socket_path: &str) -> Result<()> {
        if self.sent {
            debug!("readiness already reported, skipping");
            return Ok(());
        }

        write_line(&mut self.writer, wire::READY_LINE).await?;
        write_line(&mut self.writer, &wire::socket_announcement(socket_path)).await?;
        write_line(&mut self.writer, wire::END_LINE).await?;
        self.sent = true;
        info!(socket_path, "readiness reported");
        Ok(())
    }
}

/// Write `line` plus the `\n` terminator and flush.
async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| AppError::Io(format!("control channel write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| AppError::Io(format!("control channel flush failed: {e}")))
}
