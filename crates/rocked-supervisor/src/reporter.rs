//! Registrant side of the protocol.

use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::thread;
use std::time::Duration;

use rocked_common::error::{Result, RockedError};

use crate::protocol::Request;

/// Blocks until `path` exists, polling every `interval`.
pub fn wait_for_endpoint(path: &Path, interval: Duration) {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "waiting for supervisor endpoint");
    }
    while !path.exists() {
        thread::sleep(interval);
    }
}

/// Sends one request to the supervisor endpoint.
///
/// # Errors
///
/// Returns [`RockedError::Io`] if the datagram cannot be sent.
pub fn send(path: &Path, request: Request) -> Result<()> {
    let socket = UnixDatagram::unbound().map_err(|e| RockedError::io(path, e))?;
    let _ = socket
        .send_to(&request.encode(), path)
        .map_err(|e| RockedError::io(path, e))?;
    tracing::debug!(?request, "registration sent");
    Ok(())
}

/// Registers or deregisters a process.
///
/// Additions wait for the endpoint to appear first, since the wrapper can
/// run before the supervisor has bound it. Removals are sent once.
///
/// # Errors
///
/// Returns an error if the datagram cannot be sent.
pub fn report(path: &Path, request: Request, retry: Duration) -> Result<()> {
    if matches!(request, Request::Add(_)) {
        wait_for_endpoint(path, retry);
    }
    send(path, request)
}

/// Narrows a process id to the wire width.
///
/// # Errors
///
/// Returns [`RockedError::Protocol`] if the pid does not fit.
pub fn wire_pid(pid: i32) -> Result<u16> {
    u16::try_from(pid).map_err(|_| RockedError::Protocol {
        message: format!("pid {pid} does not fit the registration datagram"),
    })
}
