use bytes::BytesMut;
use tokio_util::codec::Decoder;

use stagehand::channel::codec::{LineCodec, MAX_LINE_BYTES};
use stagehand::AppError;

#[test]
fn decodes_newline_terminated_lines_without_terminator() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("You have control 1.0\napp_root: /srv/app\n".as_bytes());

    assert_eq!(
        codec.decode(&mut buf).unwrap(),
        Some("You have control 1.0".to_owned())
    );
    assert_eq!(
        codec.decode(&mut buf).unwrap(),
        Some("app_root: /srv/app".to_owned())
    );
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn empty_line_decodes_to_empty_string() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("\n".as_bytes());
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(String::new()));
}

#[test]
fn partial_line_stays_buffered() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("no terminator yet".as_bytes());
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b" done\n");
    assert_eq!(
        codec.decode(&mut buf).unwrap(),
        Some("no terminator yet done".to_owned())
    );
}

#[test]
fn overlong_line_is_a_protocol_error() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_BYTES + 1].as_slice());

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)), "got: {err}");
}
