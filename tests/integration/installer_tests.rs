//! Listener installation: singleton registration, bind-conflict retry,
//! readiness ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use interprocess::local_socket::tokio::prelude::*;
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, RwLock};

use stagehand::channel::ReadinessReporter;
use stagehand::installer::{ListenerInstaller, SocketPathSource};
use stagehand::{AppError, OptionsTable};

/// Path source that replays a scripted sequence, then repeats a fallback.
struct ScriptedSource {
    queued: StdMutex<VecDeque<String>>,
    fallback: String,
}

impl ScriptedSource {
    fn new(queued: Vec<String>, fallback: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            queued: StdMutex::new(queued.into()),
            fallback: fallback.into(),
        })
    }
}

impl SocketPathSource for ScriptedSource {
    fn next_path(&self) -> String {
        self.queued
            .lock()
            .map(|mut q| q.pop_front())
            .unwrap_or(None)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Installer wired to a scripted source and an in-memory readiness channel.
fn build(
    source: Arc<dyn SocketPathSource>,
) -> (
    ListenerInstaller,
    Arc<RwLock<OptionsTable>>,
    tokio::io::DuplexStream,
) {
    let options = Arc::new(RwLock::new(OptionsTable::new()));
    let (writer, read_end) = tokio::io::duplex(4096);
    let reporter = Arc::new(Mutex::new(ReadinessReporter::new(Box::new(writer))));
    let installer = ListenerInstaller::new(Arc::clone(&options), reporter, source);
    (installer, options, read_end)
}

/// Hold a listener open at `path` to force `EADDRINUSE` there.
fn occupy(path: &str) -> interprocess::local_socket::tokio::Listener {
    let name = std::path::Path::new(path)
        .to_fs_name::<GenericFilePath>()
        .unwrap();
    ListenerOptions::new().name(name).create_tokio().unwrap()
}

/// Read the three readiness lines from the supervisor's end.
async fn read_readiness_block(read_end: tokio::io::DuplexStream) -> Vec<String> {
    let mut reader = BufReader::new(read_end);
    let mut lines = Vec::new();
    for _ in 0..3 {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        lines.push(line);
    }
    lines
}

#[tokio::test]
async fn install_binds_and_announces_readiness() {
    let tmp = tempfile::tempdir().unwrap();
    let free = tmp.path().join("app.sock").to_string_lossy().into_owned();
    let (installer, options, read_end) = build(ScriptedSource::new(Vec::new(), free.as_str()));

    let listener = installer.install(None).await.unwrap();
    assert!(listener.is_managed());
    assert_eq!(listener.socket_path(), free);
    assert!(installer.is_installed().await);
    assert_eq!(installer.bound_path().await.as_deref(), Some(free.as_str()));
    assert_eq!(options.read().await.socket_path(), Some(free.as_str()));
    assert!(std::path::Path::new(&free).exists());

    let lines = read_readiness_block(read_end).await;
    assert_eq!(lines[0], "!> Ready\n");
    assert_eq!(
        lines[1],
        format!("!> socket: main;unix:{free};http_session;0\n")
    );
    assert_eq!(lines[2], "!> \n");
}

#[tokio::test]
async fn second_install_fails_and_leaves_first_registration_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let free = tmp.path().join("app.sock").to_string_lossy().into_owned();
    let (installer, options, _read_end) = build(ScriptedSource::new(Vec::new(), free.as_str()));

    let _listener = installer.install(None).await.unwrap();

    let err = installer.install(None).await.unwrap_err();
    assert!(matches!(err, AppError::Install(_)), "got: {err}");
    assert!(err.to_string().contains("already installed"));
    assert_eq!(options.read().await.socket_path(), Some(free.as_str()));
    assert_eq!(installer.bound_path().await.as_deref(), Some(free.as_str()));
}

#[tokio::test]
async fn retry_loop_recovers_from_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let conflicts: Vec<String> = (0..3)
        .map(|i| {
            tmp.path()
                .join(format!("busy-{i}.sock"))
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    let _held: Vec<_> = conflicts.iter().map(|p| occupy(p)).collect();
    let free = tmp.path().join("free.sock").to_string_lossy().into_owned();

    let (installer, options, read_end) = build(ScriptedSource::new(conflicts.clone(), free.as_str()));

    let listener = installer.install(None).await.unwrap();
    assert_eq!(listener.socket_path(), free);
    assert_eq!(options.read().await.socket_path(), Some(free.as_str()));

    // Readiness announces the path that finally bound, not any candidate.
    let lines = read_readiness_block(read_end).await;
    assert!(lines[1].contains(&free), "announced: {}", lines[1]);
    for conflict in &conflicts {
        assert!(!lines[1].contains(conflict));
    }
}

#[tokio::test]
async fn persistent_conflicts_exhaust_the_retry_bound() {
    let tmp = tempfile::tempdir().unwrap();
    let busy = tmp.path().join("busy.sock").to_string_lossy().into_owned();
    let _held = occupy(&busy);

    // Every one of the 100 attempts regenerates into the same occupied path.
    let (installer, _options, read_end) = build(ScriptedSource::new(Vec::new(), busy.as_str()));

    let err = installer.install(None).await.unwrap_err();
    assert!(matches!(err, AppError::BindExhausted(_)), "got: {err}");

    // The registration is terminal: a later attempt is "already installed".
    let err = installer.install(None).await.unwrap_err();
    assert!(matches!(err, AppError::Install(_)));

    // No readiness was reported.
    drop(installer);
    let mut reader = BufReader::new(read_end);
    let mut leftover = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut leftover)
        .await
        .unwrap();
    assert!(leftover.is_empty(), "unexpected output: {leftover:?}");
}

#[tokio::test]
async fn non_conflict_bind_failure_is_fatal_but_not_exhaustion() {
    let missing_dir = tempfile::tempdir().unwrap();
    let path = missing_dir
        .path()
        .join("nope")
        .join("app.sock")
        .to_string_lossy()
        .into_owned();

    let (installer, _options, _read_end) = build(ScriptedSource::new(Vec::new(), path.as_str()));

    let err = installer.install(None).await.unwrap_err();
    assert!(matches!(err, AppError::Io(_)), "got: {err}");
}

#[tokio::test]
async fn completion_callback_runs_before_readiness_is_scheduled() {
    let tmp = tempfile::tempdir().unwrap();
    let free = tmp.path().join("app.sock").to_string_lossy().into_owned();
    let (installer, _options, read_end) = build(ScriptedSource::new(Vec::new(), free.as_str()));

    let log: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));
    let callback_log = Arc::clone(&log);

    let _listener = installer
        .install(Some(Box::new(move |_listener| {
            if let Ok(mut entries) = callback_log.lock() {
                entries.push("listen-callback");
            }
        })))
        .await
        .unwrap();

    // Synchronous work after the bind completion, before yielding: the
    // deferred readiness task must not have run yet.
    if let Ok(mut entries) = log.lock() {
        entries.push("post-listen-setup");
    }

    let lines = read_readiness_block(read_end).await;
    assert_eq!(lines[0], "!> Ready\n");
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["listen-callback", "post-listen-setup"]
    );
}

#[tokio::test]
async fn accepted_connections_present_the_placeholder_peer() {
    let tmp = tempfile::tempdir().unwrap();
    let free = tmp.path().join("peer.sock").to_string_lossy().into_owned();
    let (installer, _options, _read_end) = build(ScriptedSource::new(Vec::new(), free.as_str()));

    let listener = installer.install(None).await.unwrap();

    let name = std::path::Path::new(&free)
        .to_fs_name::<GenericFilePath>()
        .unwrap();
    let (accepted, client) = tokio::join!(
        listener.accept(),
        interprocess::local_socket::tokio::Stream::connect(name)
    );
    let accepted = accepted.unwrap();
    let _client = client.unwrap();

    // The real peer is the supervisor's proxy, so the accessors report the
    // fixed placeholder.
    assert_eq!(accepted.peer_addr().to_string(), "127.0.0.1:0");
    assert_eq!(accepted.peer_port(), 0);
}

#[tokio::test]
async fn unmanaged_binds_skip_installation_entirely() {
    let tmp = tempfile::tempdir().unwrap();
    let first = tmp.path().join("first.sock");
    let second = tmp.path().join("second.sock");

    let a = ListenerInstaller::bind_unmanaged(&first).unwrap();
    let b = ListenerInstaller::bind_unmanaged(&second).unwrap();

    assert!(!a.is_managed());
    assert!(!b.is_managed());
    assert!(first.exists());
    assert!(second.exists());
}
