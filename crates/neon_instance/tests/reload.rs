//! Reload handshake protocol behavior, exercised with in-process parent
//! and child halves over a real UNIX socket.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use neon_instance::reload::{ChildSession, ListenerEntry, ReloadError, serve_handshake};
use neon_instance::generate_secret;

fn socket_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("neon-reload-{tag}-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn payload() -> Vec<ListenerEntry> {
    vec![
        ListenerEntry {
            name: "default".to_string(),
            files: vec!["listener:default:0".to_string()],
        },
        ListenerEntry {
            name: "metrics".to_string(),
            files: vec![
                "listener:metrics:0".to_string(),
                "listener:metrics:1".to_string(),
            ],
        },
    ]
}

#[tokio::test]
async fn handshake_completes_and_transfers_the_payload() {
    let path = socket_path("ok");
    let socket = UnixListener::bind(&path).unwrap();
    let secret = generate_secret();

    let parent = {
        let secret = secret.clone();
        tokio::spawn(async move { serve_handshake(&socket, &secret, &payload()).await })
    };

    let mut session = ChildSession::connect(&path).await.unwrap();
    let listeners = session.negotiate(&secret).await.unwrap();
    assert_eq!(listeners.len(), 2);
    assert_eq!(listeners[0].name, "default");
    assert_eq!(listeners[1].files.len(), 2);
    session.confirm().await.unwrap();

    parent.await.unwrap().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn invalid_key_is_rejected_and_reported_to_both_sides() {
    let path = socket_path("badkey");
    let socket = UnixListener::bind(&path).unwrap();

    let parent = tokio::spawn(async move { serve_handshake(&socket, "right-key", &[]).await });

    let mut session = ChildSession::connect(&path).await.unwrap();
    let child_err = session.negotiate("wrong-key").await.unwrap_err();
    assert!(matches!(child_err, ReloadError::Peer(message) if message == "invalid key"));

    let parent_err = parent.await.unwrap().unwrap_err();
    assert!(matches!(parent_err, ReloadError::InvalidKey));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn out_of_order_command_terminates_the_session() {
    let path = socket_path("ooo");
    let socket = UnixListener::bind(&path).unwrap();

    let parent = tokio::spawn(async move { serve_handshake(&socket, "secret", &[]).await });

    // Open the dialog with RELOAD instead of HELLO.
    let stream = UnixStream::connect(&path).await.unwrap();
    let (read, mut write) = stream.into_split();
    write
        .write_all(b"RELOAD:{\"key\":\"secret\"}\r\n")
        .await
        .unwrap();

    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await.unwrap();
    assert!(line.starts_with("ERROR"));

    let parent_err = parent.await.unwrap().unwrap_err();
    assert!(matches!(parent_err, ReloadError::UnexpectedCommand(_)));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn ready_before_reload_is_rejected() {
    let path = socket_path("early-ready");
    let socket = UnixListener::bind(&path).unwrap();

    let parent = tokio::spawn(async move { serve_handshake(&socket, "secret", &[]).await });

    let stream = UnixStream::connect(&path).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    write.write_all(b"HELLO\r\n").await.unwrap();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line.trim_end(), "HELLO");

    write.write_all(b"READY\r\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("ERROR"));

    assert!(parent.await.unwrap().is_err());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(start_paused = true)]
async fn absent_child_times_out_the_parent() {
    let path = socket_path("timeout");
    let socket = UnixListener::bind(&path).unwrap();

    let outcome = tokio::time::timeout(
        core::time::Duration::from_secs(5),
        serve_handshake(&socket, "secret", &[]),
    )
    .await;
    assert!(outcome.is_err());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn secrets_are_distinct_and_base64() {
    use base64::Engine;
    let first = generate_secret();
    let second = generate_secret();
    assert_ne!(first, second);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&first)
        .unwrap();
    assert_eq!(decoded.len(), 16);
}
