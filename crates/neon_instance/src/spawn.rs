//! Spawning the successor process with inherited listener sockets.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use neon_server::InheritedListeners;

use crate::reload::{CHILD_ENV, FIRST_INHERITED_FD, ListenerEntry};

/// The fd handoff prepared for one spawn: the handshake payload and the
/// duplicated descriptors, in the exact order the child will recover
/// them from fd 3 upward.
pub struct Handoff {
    /// Payload entries, one per listener, in fd order.
    pub payload: Vec<ListenerEntry>,
    /// The duplicated descriptors backing the payload.
    pub fds: Vec<OwnedFd>,
}

/// Duplicates every listener socket into a stable, name-sorted order.
///
/// The descriptors are re-duplicated above the target fd window so the
/// `dup2` calls in the spawn hook cannot collide with their sources.
///
/// # Errors
///
/// Propagates descriptor duplication failures.
pub fn prepare_handoff(listeners: &InheritedListeners) -> io::Result<Handoff> {
    let total: usize = listeners.values().map(Vec::len).sum();
    let window = i32::try_from(total)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many inherited sockets"))?;
    let floor = FIRST_INHERITED_FD + window;

    let mut names: Vec<&String> = listeners.keys().collect();
    names.sort();

    let mut payload = Vec::with_capacity(names.len());
    let mut fds = Vec::with_capacity(total);
    for name in names {
        let mut files = Vec::new();
        for (index, listener) in listeners[name.as_str()].iter().enumerate() {
            let dup = unsafe { libc::fcntl(listener.as_raw_fd(), libc::F_DUPFD, floor) };
            if dup < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: fcntl(F_DUPFD) returned a fresh descriptor we now own.
            fds.push(unsafe { OwnedFd::from_raw_fd(dup) });
            files.push(format!("listener:{name}:{index}"));
        }
        payload.push(ListenerEntry {
            name: name.clone(),
            files,
        });
    }
    Ok(Handoff { payload, fds })
}

/// Spawns the successor from the current executable with the current
/// argv and environment, plus `CHILD=<secret>`. Handles 0-2 are
/// inherited; the prepared descriptors land at fd 3 and up, in payload
/// order.
///
/// # Errors
///
/// Propagates spawn failures.
pub fn spawn_child(secret: &str, handoff: &Handoff) -> io::Result<Child> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut command = Command::new(exe);
    command.args(args).env(CHILD_ENV, secret);

    let mappings: Vec<(i32, i32)> = handoff
        .fds
        .iter()
        .enumerate()
        .map(|(index, fd)| (fd.as_raw_fd(), FIRST_INHERITED_FD + index as i32))
        .collect();

    // SAFETY: the hook only calls async-signal-safe libc functions.
    unsafe {
        command.pre_exec(move || {
            for (source, target) in &mappings {
                if libc::dup2(*source, *target) < 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            for (source, _) in &mappings {
                libc::close(*source);
            }
            Ok(())
        });
    }

    command.spawn()
}
