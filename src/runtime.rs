//! Adapter runtime: handshake, application entry, shutdown.
//!
//! [`Runtime::run`] is the worker's whole lifecycle: perform the handshake
//! over the standard streams, construct an [`AppContext`], hand it to the
//! application entry, then wait for the supervisor to close the channel.
//! [`Runtime::run_with_io`] does the same over arbitrary stream halves so
//! the full lifecycle is drivable through in-memory pipes.
//!
//! The context replaces any process-wide configuration singleton: options,
//! the application-facing `configure` call, the managed-listen operation,
//! and shutdown subscription all live on the explicit [`AppContext`] value
//! handed to the entry point.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use crate::channel::{HandshakeChannel, HandshakeState, ReadinessReporter};
use crate::installer::{
    ListenCallback, ListenTarget, ListenerInstaller, ManagedListener, SocketAddressGenerator,
    SocketPathSource,
};
use crate::options::OptionsTable;
use crate::shutdown::{ShutdownHook, ShutdownOutcome};
use crate::Result;

/// Application-facing adapter configuration.
///
/// Passed to [`AppContext::configure`] before the first listen call.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Whether the first listener-creation call is taken over
    /// automatically. Defaults to `true`; disable to enter manual-install
    /// mode, where only the [`ListenTarget::Managed`] sentinel installs and
    /// explicit addresses bind unmanaged.
    pub auto_install: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self { auto_install: true }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

struct ContextInner {
    options: Arc<RwLock<OptionsTable>>,
    installer: ListenerInstaller,
    hook: Arc<ShutdownHook>,
    session: Arc<Mutex<HandshakeState>>,
    auto_install: AtomicBool,
}

/// Explicit context value handed to the application entry point.
///
/// Cheaply cloneable; all state is shared behind the clone.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish_non_exhaustive()
    }
}

impl AppContext {
    /// Snapshot of the startup options.
    pub async fn options(&self) -> OptionsTable {
        self.inner.options.read().await.clone()
    }

    /// Look up one option value.
    pub async fn option(&self, key: &str) -> Option<String> {
        self.inner.options.read().await.get(key).map(ToOwned::to_owned)
    }

    /// Resolved application startup path (`app_root` + `startup_file`).
    pub async fn startup_path(&self) -> PathBuf {
        self.inner.options.read().await.startup_path()
    }

    /// Adjust the adapter's behavior for this application.
    pub fn configure(&self, config: &AdapterConfig) {
        self.inner
            .auto_install
            .store(config.auto_install, Ordering::SeqCst);
        debug!(auto_install = config.auto_install, "adapter reconfigured");
    }

    /// Current handshake-session phase.
    pub async fn session_state(&self) -> HandshakeState {
        *self.inner.session.lock().await
    }

    /// Open a listener. See [`Self::listen_with`] for the capture rules.
    ///
    /// # Errors
    ///
    /// Same as [`Self::listen_with`].
    pub async fn listen(&self, target: ListenTarget) -> Result<ManagedListener> {
        self.listen_impl(target, None).await
    }

    /// Open a listener, invoking `ready` exactly once after a successful
    /// bind.
    ///
    /// Capture rules:
    /// - [`ListenTarget::Managed`] always installs the managed listener.
    /// - [`ListenTarget::Path`] installs too while auto-install is active
    ///   (the default) — the requested address is discarded in favor of a
    ///   generated socket path.
    /// - With auto-install disabled, [`ListenTarget::Path`] binds unmanaged
    ///   at exactly the requested path; any number of unmanaged listeners
    ///   may be opened this way.
    ///
    /// # Errors
    ///
    /// - [`crate::AppError::Install`] — a managed installation already
    ///   happened; existing state is untouched.
    /// - [`crate::AppError::BindExhausted`] — the bind-retry loop ran out
    ///   of attempts.
    /// - [`crate::AppError::Io`] — a non-conflict bind failure, or any
    ///   unmanaged bind failure.
    pub async fn listen_with(
        &self,
        target: ListenTarget,
        ready: ListenCallback,
    ) -> Result<ManagedListener> {
        self.listen_impl(target, Some(ready)).await
    }

    /// Register for shutdown notification.
    ///
    /// While at least one subscriber is alive when the control channel
    /// closes, the runtime reports [`ShutdownOutcome::Notified`] instead of
    /// [`ShutdownOutcome::Exit`], deferring the exit decision.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.inner.hook.subscribe()
    }

    /// Explicit internal shutdown trigger; equivalent to the supervisor
    /// closing the channel.
    pub fn request_shutdown(&self) {
        self.inner.hook.internal_trigger().cancel();
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    async fn listen_impl(
        &self,
        target: ListenTarget,
        ready: Option<ListenCallback>,
    ) -> Result<ManagedListener> {
        let auto_install = self.inner.auto_install.load(Ordering::SeqCst);

        let install = match target {
            ListenTarget::Managed => None,
            ListenTarget::Path(path) if auto_install => {
                debug!(requested = %path.display(), "auto-install: capturing listen call");
                None
            }
            ListenTarget::Path(path) => Some(path),
        };

        if let Some(path) = install {
            let listener = ListenerInstaller::bind_unmanaged(&path)?;
            if let Some(ready) = ready {
                ready(&listener);
            }
            return Ok(listener);
        }

        let listener = self.inner.installer.install(ready).await?;
        *self.inner.session.lock().await = HandshakeState::Installed;
        Ok(listener)
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// The adapter's lifecycle driver.
#[derive(Debug)]
pub struct Runtime;

impl Runtime {
    /// Run the adapter over the process's standard streams.
    ///
    /// The caller's `main` translates the returned outcome into the process
    /// exit: [`ShutdownOutcome::Exit`] means return success now, while
    /// [`ShutdownOutcome::Notified`] leaves the decision to the
    /// application's shutdown subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Protocol`] on any handshake violation —
    /// the binary must exit non-zero — and propagates errors from the
    /// application entry.
    pub async fn run<F, Fut>(entry: F) -> Result<ShutdownOutcome>
    where
        F: FnOnce(AppContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        Self::run_with_io(tokio::io::stdin(), tokio::io::stdout(), entry).await
    }

    /// Run the adapter over arbitrary stream halves.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub async fn run_with_io<R, W, F, Fut>(reader: R, writer: W, entry: F) -> Result<ShutdownOutcome>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        F: FnOnce(AppContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut channel = HandshakeChannel::new(reader, writer);
        let table = channel.run().await?;

        let startup_path = table.startup_path();
        let generator = SocketAddressGenerator::from_options(&table);
        let (read_half, write_half) = channel.into_parts();

        let context = build_context(table, Arc::new(generator), Box::new(write_half));
        info!(startup_path = %startup_path.display(), "loading application");

        let hook = Arc::clone(&context.inner.hook);
        let session = Arc::clone(&context.inner.session);
        let watch_task = tokio::spawn(async move { hook.run(read_half).await });

        if let Err(err) = entry(context.clone()).await {
            watch_task.abort();
            return Err(err);
        }

        let outcome = watch_task
            .await
            .unwrap_or(ShutdownOutcome::Exit);
        *session.lock().await = HandshakeState::Terminated;
        info!(?outcome, "adapter shut down");
        Ok(outcome)
    }
}

/// Assemble the shared context from the handshake products.
fn build_context(
    table: OptionsTable,
    source: Arc<dyn SocketPathSource>,
    writer: crate::channel::ChannelWriter,
) -> AppContext {
    let options = Arc::new(RwLock::new(table));
    let reporter = Arc::new(Mutex::new(ReadinessReporter::new(writer)));
    let installer = ListenerInstaller::new(Arc::clone(&options), reporter, source);
    let hook = Arc::new(ShutdownHook::new(Arc::clone(&options)));

    AppContext {
        inner: Arc::new(ContextInner {
            options,
            installer,
            hook,
            session: Arc::new(Mutex::new(HandshakeState::Ready)),
            auto_install: AtomicBool::new(true),
        }),
    }
}
