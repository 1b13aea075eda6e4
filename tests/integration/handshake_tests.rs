//! Adapter-side handshake state machine over in-memory pipes.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use stagehand::channel::{HandshakeChannel, HandshakeState};
use stagehand::{AppError, OptionsTable, Result};

/// Run the worker-side handshake against a scripted supervisor.
///
/// The script is written up front (the duplex buffer is large enough for
/// any handshake) and the stream is shut down afterwards, so end-of-script
/// doubles as end-of-stream.
async fn run_against(script: &str) -> (Result<OptionsTable>, HandshakeState, String) {
    let (worker_end, supervisor_end) = tokio::io::duplex(4096);
    let (worker_read, worker_write) = tokio::io::split(worker_end);
    let (mut supervisor_read, mut supervisor_write) = tokio::io::split(supervisor_end);

    supervisor_write.write_all(script.as_bytes()).await.unwrap();
    supervisor_write.shutdown().await.unwrap();

    let mut channel = HandshakeChannel::new(worker_read, worker_write);
    let result = channel.run().await;
    let state = channel.state();
    drop(channel);

    let mut emitted = String::new();
    supervisor_read.read_to_string(&mut emitted).await.unwrap();

    (result, state, emitted)
}

#[tokio::test]
async fn greeting_is_emitted_before_anything_else() {
    let (_, _, emitted) = run_against("You have control 1.0\n\n").await;
    assert!(
        emitted.starts_with("!> I have control 1.0\n"),
        "greeting missing from: {emitted:?}"
    );
}

#[tokio::test]
async fn well_formed_option_block_is_captured_exactly() {
    let script = "You have control 1.0\n\
                  app_root: /srv/app\n\
                  startup_file: server.js\n\
                  generation_dir: /var/run/sup/gen-1\n\
                  \n";
    let (result, state, _) = run_against(script).await;

    let table = result.unwrap();
    assert_eq!(state, HandshakeState::Ready);
    assert_eq!(table.len(), 3);
    assert_eq!(table.app_root(), Some("/srv/app"));
    assert_eq!(table.startup_file(), "server.js");
    assert_eq!(table.generation_dir(), Some("/var/run/sup/gen-1"));
}

#[tokio::test]
async fn startup_path_resolution_uses_default_entry_module() {
    let script = "You have control 1.0\napp_root: /srv/app\n\n";
    let (result, _, _) = run_against(script).await;
    let table = result.unwrap();
    assert_eq!(
        table.startup_path(),
        std::path::PathBuf::from("/srv/app/app.js")
    );
}

#[tokio::test]
async fn duplicate_option_keys_resolve_last_write_wins() {
    let script = "You have control 1.0\n\
                  app_root: /first\n\
                  app_root: /second\n\
                  \n";
    let (result, _, _) = run_against(script).await;
    let table = result.unwrap();
    assert_eq!(table.app_root(), Some("/second"));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn empty_option_block_yields_empty_table() {
    let (result, state, _) = run_against("You have control 1.0\n\n").await;
    assert!(result.unwrap().is_empty());
    assert_eq!(state, HandshakeState::Ready);
}

#[tokio::test]
async fn option_values_keep_embedded_colons() {
    let script = "You have control 1.0\nlisten_uri: unix:/tmp/a.sock\n\n";
    let (result, _, _) = run_against(script).await;
    assert_eq!(
        result.unwrap().get("listen_uri"),
        Some("unix:/tmp/a.sock")
    );
}

#[tokio::test]
async fn version_mismatch_is_a_protocol_error() {
    let (result, state, _) = run_against("You have control 2.0\n\n").await;
    assert!(matches!(result.unwrap_err(), AppError::Protocol(_)));
    assert_eq!(state, HandshakeState::AwaitHeader);
}

#[tokio::test]
async fn garbage_header_is_a_protocol_error() {
    let (result, _, _) = run_against("hello worker\n\n").await;
    assert!(matches!(result.unwrap_err(), AppError::Protocol(_)));
}

#[tokio::test]
async fn stream_end_before_header_is_a_protocol_error() {
    let (result, _, _) = run_against("").await;
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)), "got: {err}");
}

#[tokio::test]
async fn stream_end_before_options_terminator_is_a_protocol_error() {
    let script = "You have control 1.0\napp_root: /srv/app\n";
    let (result, state, _) = run_against(script).await;
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)), "got: {err}");
    assert_eq!(state, HandshakeState::ReadingOptions);
}

#[tokio::test]
async fn malformed_option_line_is_a_protocol_error() {
    let script = "You have control 1.0\nthis line has no separator\n\n";
    let (result, _, _) = run_against(script).await;
    assert!(matches!(result.unwrap_err(), AppError::Protocol(_)));
}

#[tokio::test]
async fn handshake_steps_reject_out_of_order_calls() {
    let (worker_end, _supervisor_end) = tokio::io::duplex(4096);
    let (worker_read, worker_write) = tokio::io::split(worker_end);
    let mut channel = HandshakeChannel::new(worker_read, worker_write);

    // Header before greeting: the sequence is strict.
    let err = channel.read_header().await.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)));
    assert_eq!(channel.state(), HandshakeState::Init);
}
