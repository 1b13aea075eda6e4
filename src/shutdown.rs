//! Channel-closure watch and socket teardown.
//!
//! After the handshake the control channel's read half has exactly one job
//! left: signalling shutdown. The supervisor closing its side of the stream
//! (EOF) — or an explicit internal trigger — runs the hook once: the active
//! socket file is removed best-effort, then either the process is told to
//! exit or registered subscribers are notified instead, deferring the exit
//! decision to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::{watch, RwLock};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::codec::LineCodec;
use crate::options::OptionsTable;

/// What the embedding binary should do after the hook has run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No subscribers were registered: terminate with success status.
    Exit,
    /// Subscribers were notified; they own the exit decision.
    Notified,
}

/// One-shot teardown hook for the adapter's managed socket.
pub struct ShutdownHook {
    options: Arc<RwLock<OptionsTable>>,
    notify: watch::Sender<bool>,
    triggered: AtomicBool,
    internal: CancellationToken,
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("triggered", &self.triggered.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ShutdownHook {
    /// Create a hook over the shared options (the source of the active
    /// `socket_path`).
    #[must_use]
    pub fn new(options: Arc<RwLock<OptionsTable>>) -> Self {
        let (notify, _initial) = watch::channel(false);
        Self {
            options,
            notify,
            triggered: AtomicBool::new(false),
            internal: CancellationToken::new(),
        }
    }

    /// Register a shutdown-notification subscriber.
    ///
    /// The receiver observes `true` once shutdown has been triggered. While
    /// at least one subscriber is alive at trigger time, the hook notifies
    /// instead of requesting process exit.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.notify.subscribe()
    }

    /// Token for the explicit internal shutdown trigger.
    #[must_use]
    pub fn internal_trigger(&self) -> &CancellationToken {
        &self.internal
    }

    /// Watch the post-handshake read half until the supervisor closes the
    /// stream or the internal trigger fires, then run the hook.
    pub async fn run<R>(&self, mut reader: FramedRead<R, LineCodec>) -> ShutdownOutcome
    where
        R: AsyncRead + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                () = self.internal.cancelled() => {
                    info!("internal shutdown trigger fired");
                    break;
                }

                item = reader.next() => {
                    match item {
                        None => {
                            info!("control channel closed by supervisor");
                            break;
                        }
                        Some(Err(err)) => {
                            warn!(%err, "control channel error, treating as closure");
                            break;
                        }
                        Some(Ok(line)) => {
                            // Nothing is expected on the channel after the
                            // options terminator.
                            debug!(line = %line, "ignoring post-handshake control line");
                        }
                    }
                }
            }
        }

        self.trigger().await
    }

    /// Run the teardown once: best-effort socket removal, then the
    /// exit-vs-notify decision. Later calls skip the removal and only
    /// repeat the decision.
    pub async fn trigger(&self) -> ShutdownOutcome {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let socket_path = self
                .options
                .read()
                .await
                .socket_path()
                .map(ToOwned::to_owned);

            if let Some(path) = socket_path {
                // Best-effort: the file may already be gone, the directory
                // unwritable, or the bind may never have succeeded.
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path, "socket file removed"),
                    Err(err) => debug!(path = %path, %err, "socket cleanup skipped"),
                }
            }
        }

        if self.notify.receiver_count() == 0 {
            ShutdownOutcome::Exit
        } else {
            if self.notify.send(true).is_err() {
                warn!("all shutdown subscribers dropped before notification");
                return ShutdownOutcome::Exit;
            }
            ShutdownOutcome::Notified
        }
    }
}
