//! Managed listener installation.
//!
//! The installer captures the application's listener-creation call and
//! substitutes a supervisor-visible local socket for whatever address the
//! application asked for. Installation happens at most once per process:
//! the registration transitions `UNINSTALLED → BINDING → {BOUND | FATAL}`
//! exactly once, with bounded conflict retry looping inside `BINDING`.
//!
//! Submodules:
//! - `pathgen`: candidate socket path generation.

pub mod pathgen;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use interprocess::local_socket::tokio::prelude::*;
use interprocess::local_socket::tokio::{Listener, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::channel::ReadinessReporter;
use crate::options::OptionsTable;
use crate::{AppError, Result};

pub use pathgen::{SocketAddressGenerator, SocketPathSource};

/// Upper bound on bind attempts before the installation fails.
pub const MAX_BIND_ATTEMPTS: usize = 100;

/// Peer address reported for connections on a managed socket.
///
/// The real peer is the supervisor's proxy, not an external client, so
/// accepted connections present a fixed placeholder instead.
pub const PLACEHOLDER_PEER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

/// Address requested by the application's listen call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenTarget {
    /// Reserved sentinel: explicitly opt into managed installation.
    Managed,
    /// An explicit socket path. Captured anyway while auto-install is
    /// active; bound as-is in manual-install mode.
    Path(std::path::PathBuf),
}

/// Listen-completion callback, invoked exactly once after a successful bind
/// and before the readiness report is scheduled.
pub type ListenCallback = Box<dyn FnOnce(&ManagedListener) + Send>;

// ── Registration ──────────────────────────────────────────────────────────────

/// Lifecycle of the one managed registration this process may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RegistrationState {
    /// No installation attempt yet.
    Uninstalled,
    /// Bind-retry loop in progress.
    Binding,
    /// Terminal success; the path is the bound socket.
    Bound(String),
    /// Terminal failure; the bind loop was exhausted or errored.
    Fatal,
}

// ── Listener & stream wrappers ────────────────────────────────────────────────

/// A bound local-socket listener, managed or pass-through.
pub struct ManagedListener {
    listener: Listener,
    path: String,
    managed: bool,
}

impl std::fmt::Debug for ManagedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedListener")
            .field("path", &self.path)
            .field("managed", &self.managed)
            .finish_non_exhaustive()
    }
}

impl ManagedListener {
    /// Filesystem path the listener is bound to.
    #[must_use]
    pub fn socket_path(&self) -> &str {
        &self.path
    }

    /// Whether this listener was installed by the supervisor (as opposed to
    /// an unmanaged pass-through bind).
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    /// Accept the next inbound connection.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the accept fails.
    pub async fn accept(&self) -> Result<ManagedStream> {
        let stream = self
            .listener
            .accept()
            .await
            .map_err(|e| AppError::Io(format!("accept on {} failed: {e}", self.path)))?;
        Ok(ManagedStream { stream })
    }
}

/// An accepted connection on a [`ManagedListener`].
///
/// Peer accessors return [`PLACEHOLDER_PEER`]: the other end of a managed
/// socket is always the supervisor's proxy.
pub struct ManagedStream {
    stream: Stream,
}

impl std::fmt::Debug for ManagedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStream").finish_non_exhaustive()
    }
}

impl ManagedStream {
    /// Placeholder peer address (`127.0.0.1`).
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        PLACEHOLDER_PEER
    }

    /// Placeholder peer port (`0`).
    #[must_use]
    pub fn peer_port(&self) -> u16 {
        PLACEHOLDER_PEER.port()
    }

    /// Split into receive and send halves for independent I/O.
    #[must_use]
    pub fn split(self) -> (RecvHalf, SendHalf) {
        self.stream.split()
    }

    /// Unwrap the underlying local-socket stream.
    #[must_use]
    pub fn into_inner(self) -> Stream {
        self.stream
    }
}

// ── Installer ─────────────────────────────────────────────────────────────────

/// Singleton listener installer for one adapter process.
pub struct ListenerInstaller {
    options: Arc<RwLock<OptionsTable>>,
    reporter: Arc<Mutex<ReadinessReporter>>,
    source: Arc<dyn SocketPathSource>,
    registration: Mutex<RegistrationState>,
}

impl std::fmt::Debug for ListenerInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerInstaller").finish_non_exhaustive()
    }
}

impl ListenerInstaller {
    /// Create an installer over the shared options, the channel's readiness
    /// reporter, and a socket path source.
    #[must_use]
    pub fn new(
        options: Arc<RwLock<OptionsTable>>,
        reporter: Arc<Mutex<ReadinessReporter>>,
        source: Arc<dyn SocketPathSource>,
    ) -> Self {
        Self {
            options,
            reporter,
            source,
            registration: Mutex::new(RegistrationState::Uninstalled),
        }
    }

    /// Whether a managed installation has been attempted.
    pub async fn is_installed(&self) -> bool {
        !matches!(*self.registration.lock().await, RegistrationState::Uninstalled)
    }

    /// Bound socket path, once the registration reached `Bound`.
    pub async fn bound_path(&self) -> Option<String> {
        match &*self.registration.lock().await {
            RegistrationState::Bound(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Install the managed listener: claim the registration, bind with
    /// retry, invoke the completion callback, schedule the readiness report.
    ///
    /// The readiness report is deferred to the next scheduling tick so any
    /// synchronous setup the caller performs after the bind completes runs
    /// before the supervisor is told the worker is ready.
    ///
    /// # Errors
    ///
    /// - [`AppError::Install`] — a registration already exists. The call is
    ///   side-effect-free in this case.
    /// - [`AppError::BindExhausted`] — [`MAX_BIND_ATTEMPTS`] consecutive
    ///   bind conflicts. The registration is terminally `Fatal`.
    /// - [`AppError::Io`] — a bind failure other than a path conflict.
    pub async fn install(&self, callback: Option<ListenCallback>) -> Result<ManagedListener> {
        {
            let mut registration = self.registration.lock().await;
            if !matches!(*registration, RegistrationState::Uninstalled) {
                return Err(AppError::Install(
                    "listener already installed: a managed listener may only be \
                     requested once per process"
                        .into(),
                ));
            }
            *registration = RegistrationState::Binding;
        }

        let (listener, path) = match self.bind_with_retry().await {
            Ok(bound) => bound,
            Err(err) => {
                *self.registration.lock().await = RegistrationState::Fatal;
                return Err(err);
            }
        };

        *self.registration.lock().await = RegistrationState::Bound(path.clone());

        let listener = ManagedListener {
            listener,
            path: path.clone(),
            managed: true,
        };

        if let Some(callback) = callback {
            callback(&listener);
        }

        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move {
            if let Err(err) = reporter.lock().await.report(&path).await {
                warn!(%err, "failed to report readiness");
            }
        });

        Ok(listener)
    }

    /// Bind at a requested path without installation: no path generation,
    /// no retry, no readiness report. Manual-install mode may open any
    /// number of these.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the bind fails, conflicts included.
    pub fn bind_unmanaged(path: &Path) -> Result<ManagedListener> {
        let display = path.to_string_lossy().into_owned();
        let listener = bind_at(&display)
            .map_err(|e| AppError::Io(format!("failed to bind {display}: {e}")))?;
        Ok(ManagedListener {
            listener,
            path: display,
            managed: false,
        })
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    /// Explicit bounded bind loop. Each attempt records its candidate as the
    /// active `socket_path` before binding, so the final recorded value is
    /// the bound path. Conflicts yield to the scheduler and retry without
    /// sleeping.
    async fn bind_with_retry(&self) -> Result<(Listener, String)> {
        for attempt in 1..=MAX_BIND_ATTEMPTS {
            let candidate = self.source.next_path();
            self.options.write().await.set_socket_path(candidate.clone());

            match bind_at(&candidate) {
                Ok(listener) => {
                    debug!(attempt, path = %candidate, "listener bound");
                    return Ok((listener, candidate));
                }
                Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                    debug!(attempt, path = %candidate, "socket path in use, regenerating");
                    tokio::task::yield_now().await;
                }
                Err(err) => {
                    return Err(AppError::Io(format!(
                        "failed to bind {candidate}: {err}"
                    )));
                }
            }
        }

        Err(AppError::BindExhausted(format!(
            "could not find a free socket path in {MAX_BIND_ATTEMPTS} attempts"
        )))
    }
}

/// Create a local-socket listener at a filesystem path.
fn bind_at(path: &str) -> std::io::Result<Listener> {
    let name = Path::new(path).to_fs_name::<GenericFilePath>()?;
    ListenerOptions::new().name(name).create_tokio()
}
