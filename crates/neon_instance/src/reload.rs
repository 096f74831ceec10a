//! The parent↔child hot-reload handshake.
//!
//! The dialog is line-oriented and CRLF-terminated, over a UNIX domain
//! socket:
//!
//! 1. child → parent `HELLO`
//! 2. parent → child `HELLO`
//! 3. child → parent `RELOAD:{"key":"<secret>"}`
//! 4. parent → child `OK {"listeners":[{"name":...,"files":[...]},...]}`
//!    (or `ERROR:invalid key`)
//! 5. the child rebuilds its listening sockets from inherited fds, in
//!    payload order, starting at fd 3
//! 6. child → parent `READY`
//! 7. parent → child `OK`
//!
//! Any unrecognized or out-of-order command elicits `ERROR` and ends the
//! session. The handshake payload is the source of truth for fd order;
//! the ordinal recovery on the child is derived from it.

use std::net::TcpListener;
use std::os::fd::FromRawFd;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

use neon_server::InheritedListeners;

/// Environment variable carrying the reload secret; its presence marks
/// the child role.
pub const CHILD_ENV: &str = "CHILD";

/// Environment variable overriding the reload socket path.
pub const CHILD_SOCKET_ENV: &str = "CHILD_SOCKET";

/// Default reload socket path.
pub const DEFAULT_SOCKET: &str = "neon.sock";

/// First file descriptor carrying an inherited socket on the child;
/// stdin/stdout/stderr occupy 0-2.
pub const FIRST_INHERITED_FD: i32 = 3;

/// The reload socket path, from `CHILD_SOCKET` or the default.
#[must_use]
pub fn socket_path() -> PathBuf {
    std::env::var(CHILD_SOCKET_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_SOCKET), PathBuf::from)
}

/// Error raised during the reload handshake.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The peer sent the wrong secret.
    #[error("invalid reload key")]
    InvalidKey,

    /// The peer sent a command out of order or unknown.
    #[error("unexpected command: {0}")]
    UnexpectedCommand(String),

    /// The peer reported an error.
    #[error("peer error: {0}")]
    Peer(String),

    /// A malformed payload or message.
    #[error("protocol: {0}")]
    Protocol(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out")]
    Timeout,

    /// Socket I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One listener's inherited files as declared in the handshake payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerEntry {
    /// The listener name.
    pub name: String,
    /// One symbolic name per inherited fd, in fd order.
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListenerPayload {
    listeners: Vec<ListenerEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReloadRequest {
    key: String,
}

struct LineStream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineStream {
    fn new(stream: UnixStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), ReloadError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, ReloadError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(ReloadError::Protocol("connection closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parent side
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts one child connection and runs the parent side of the
/// handshake. Returns once the child has confirmed `READY`.
///
/// # Errors
///
/// Returns a [`ReloadError`] on an invalid key, an out-of-order command
/// or socket I/O failure. The offending session is answered with an
/// `ERROR` line before the error is returned.
pub async fn serve_handshake(
    listener: &UnixListener,
    secret: &str,
    payload: &[ListenerEntry],
) -> Result<(), ReloadError> {
    let (stream, _) = listener.accept().await?;
    let mut stream = LineStream::new(stream);

    let hello = stream.receive().await?;
    if hello != "HELLO" {
        stream.send("ERROR:expected HELLO").await?;
        return Err(ReloadError::UnexpectedCommand(hello));
    }
    stream.send("HELLO").await?;

    let line = stream.receive().await?;
    let Some(request) = line.strip_prefix("RELOAD:") else {
        stream.send("ERROR:expected RELOAD").await?;
        return Err(ReloadError::UnexpectedCommand(line));
    };
    let request: ReloadRequest = serde_json::from_str(request)
        .map_err(|err| ReloadError::Protocol(err.to_string()))?;
    if request.key != secret {
        stream.send("ERROR:invalid key").await?;
        return Err(ReloadError::InvalidKey);
    }

    let listeners = serde_json::to_string(&ListenerPayload {
        listeners: payload.to_vec(),
    })
    .map_err(|err| ReloadError::Protocol(err.to_string()))?;
    stream.send(&format!("OK {listeners}")).await?;

    let ready = stream.receive().await?;
    if ready != "READY" {
        stream.send("ERROR:expected READY").await?;
        return Err(ReloadError::UnexpectedCommand(ready));
    }
    stream.send("OK").await?;
    tracing::info!("reload handshake complete, successor is ready");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Child side
// ─────────────────────────────────────────────────────────────────────────────

/// The child's open handshake session.
pub struct ChildSession {
    stream: LineStream,
}

impl ChildSession {
    /// Connects to the parent's reload socket.
    ///
    /// # Errors
    ///
    /// Propagates connection failures.
    pub async fn connect(path: &Path) -> Result<Self, ReloadError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: LineStream::new(stream),
        })
    }

    /// Runs the dialog up to the listener payload: HELLO exchange, then
    /// the keyed RELOAD request.
    ///
    /// # Errors
    ///
    /// Surfaces `ERROR` replies and malformed payloads.
    pub async fn negotiate(&mut self, secret: &str) -> Result<Vec<ListenerEntry>, ReloadError> {
        self.stream.send("HELLO").await?;
        let hello = self.stream.receive().await?;
        if hello != "HELLO" {
            return Err(peer_or_unexpected(hello));
        }

        let request = serde_json::to_string(&ReloadRequest {
            key: secret.to_string(),
        })
        .map_err(|err| ReloadError::Protocol(err.to_string()))?;
        self.stream.send(&format!("RELOAD:{request}")).await?;

        let line = self.stream.receive().await?;
        let Some(payload) = line.strip_prefix("OK ") else {
            return Err(peer_or_unexpected(line));
        };
        let payload: ListenerPayload = serde_json::from_str(payload)
            .map_err(|err| ReloadError::Protocol(err.to_string()))?;
        Ok(payload.listeners)
    }

    /// Confirms the recovered sockets with `READY` and awaits the
    /// terminal `OK`.
    ///
    /// # Errors
    ///
    /// Surfaces `ERROR` replies.
    pub async fn confirm(&mut self) -> Result<(), ReloadError> {
        self.stream.send("READY").await?;
        let ok = self.stream.receive().await?;
        if ok != "OK" {
            return Err(peer_or_unexpected(ok));
        }
        Ok(())
    }
}

fn peer_or_unexpected(line: String) -> ReloadError {
    match line.strip_prefix("ERROR:") {
        Some(message) => ReloadError::Peer(message.to_string()),
        None => ReloadError::UnexpectedCommand(line),
    }
}

/// Rebuilds listening sockets from inherited fds.
///
/// The child identifies inherited sockets purely by ordinal starting at
/// fd 3, in the order the payload declares them.
///
/// # Errors
///
/// Propagates socket configuration failures.
///
/// # Safety
///
/// The caller must only invoke this in a freshly spawned child whose
/// parent actually placed the declared sockets at fds 3 and up.
pub unsafe fn recover_listeners(
    payload: &[ListenerEntry],
) -> std::io::Result<InheritedListeners> {
    let mut inherited = InheritedListeners::new();
    let mut next_fd = FIRST_INHERITED_FD;
    for entry in payload {
        let mut sockets = Vec::with_capacity(entry.files.len());
        for file in &entry.files {
            // SAFETY: per the contract above, the parent transferred an
            // open listening socket at this ordinal.
            let listener = unsafe { TcpListener::from_raw_fd(next_fd) };
            tracing::debug!(listener = entry.name, file, fd = next_fd, "socket recovered");
            next_fd += 1;
            sockets.push(listener);
        }
        inherited.insert(entry.name.clone(), sockets);
    }
    Ok(inherited)
}
