//! Supervisor-side handshake driver: option emission and readiness parsing.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use stagehand::supervisor::{read_readiness, send_header_and_options};
use stagehand::AppError;

fn option(key: &str, value: &str) -> (String, String) {
    (key.to_owned(), value.to_owned())
}

#[tokio::test]
async fn header_and_option_block_match_the_wire_format() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);

    let options = [
        option("app_root", "/srv/app"),
        option("startup_file", "server.js"),
    ];
    send_header_and_options(&mut write_end, &options)
        .await
        .unwrap();
    drop(write_end);

    let mut sent = String::new();
    let mut read_end = read_end;
    read_end.read_to_string(&mut sent).await.unwrap();
    assert_eq!(
        sent,
        "You have control 1.0\napp_root: /srv/app\nstartup_file: server.js\n\n"
    );
}

#[tokio::test]
async fn empty_option_list_sends_header_and_terminator_only() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    send_header_and_options(&mut write_end, &[]).await.unwrap();
    drop(write_end);

    let mut sent = String::new();
    let mut read_end = read_end;
    read_end.read_to_string(&mut sent).await.unwrap();
    assert_eq!(sent, "You have control 1.0\n\n");
}

#[tokio::test]
async fn readiness_block_is_parsed() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end
        .write_all(b"!> Ready\n!> socket: main;unix:/tmp/StagehandApp.k9x;http_session;0\n!> \n")
        .await
        .unwrap();

    let mut reader = BufReader::new(read_end);
    let report = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(report.name, "main");
    assert_eq!(report.socket_path, "/tmp/StagehandApp.k9x");
    assert_eq!(report.protocol, "http_session");
    assert_eq!(report.concurrency, 0);
}

#[tokio::test]
async fn unrelated_lines_before_the_block_are_skipped() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end
        .write_all(
            b"some stray diagnostic\n!> Ready\n!> socket: main;unix:/tmp/a.sock;http_session;0\n!> \n",
        )
        .await
        .unwrap();

    let mut reader = BufReader::new(read_end);
    let report = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(report.socket_path, "/tmp/a.sock");
}

#[tokio::test]
async fn end_marker_without_announcement_is_an_error() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end.write_all(b"!> Ready\n!> \n").await.unwrap();

    let mut reader = BufReader::new(read_end);
    let err = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Supervisor(_)), "got: {err}");
}

#[tokio::test]
async fn end_marker_without_ready_line_is_an_error() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end
        .write_all(b"!> socket: main;unix:/tmp/a.sock;http_session;0\n!> \n")
        .await
        .unwrap();

    let mut reader = BufReader::new(read_end);
    let err = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing ready line"), "got: {err}");
}

#[tokio::test]
async fn malformed_socket_announcement_is_an_error() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end
        .write_all(b"!> Ready\n!> socket: main;tcp:9000;http_session;0\n")
        .await
        .unwrap();

    let mut reader = BufReader::new(read_end);
    let err = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("malformed socket announcement"),
        "got: {err}"
    );
}

#[tokio::test]
async fn worker_exit_before_block_end_is_an_error() {
    let (mut write_end, read_end) = tokio::io::duplex(4096);
    write_end.write_all(b"!> Ready\n").await.unwrap();
    drop(write_end);

    let mut reader = BufReader::new(read_end);
    let err = read_readiness(&mut reader, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("worker exited during startup"),
        "got: {err}"
    );
}

#[tokio::test]
async fn silent_worker_hits_the_readiness_timeout() {
    let (_write_end, read_end) = tokio::io::duplex(4096);

    let mut reader = BufReader::new(read_end);
    let err = read_readiness(&mut reader, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("readiness timeout"), "got: {err}");
}
