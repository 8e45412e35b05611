//! Supervisor event loop.
//!
//! One task multiplexes the registration socket, the termination event
//! source and the drain watchdog, so every mutation of the tracked set is
//! ordered with respect to watchdog reads.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use rocked_common::error::{Result, RockedError};
use tokio::net::UnixDatagram;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::protocol::{DATAGRAM_LEN, Request};
use crate::relay::SignalRelay;
use crate::tracked::{Action, DrainPolicy, Tracker};

/// Source of termination requests.
pub trait TerminationSource {
    /// Resolves on the next request; `None` once no more can arrive.
    fn recv(&mut self) -> impl Future<Output = Option<()>>;
}

impl TerminationSource for tokio::signal::unix::Signal {
    fn recv(&mut self) -> impl Future<Output = Option<()>> {
        tokio::signal::unix::Signal::recv(self)
    }
}

impl TerminationSource for mpsc::Receiver<()> {
    fn recv(&mut self) -> impl Future<Output = Option<()>> {
        mpsc::Receiver::recv(self)
    }
}

/// The bound registration socket. The socket file is removed on drop.
#[derive(Debug)]
pub struct Endpoint {
    path: PathBuf,
    socket: UnixDatagram,
}

impl Endpoint {
    /// Binds a fresh socket at `path`, removing any stale leftover first.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Io`] if the leftover cannot be removed or the
    /// socket cannot be bound.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale endpoint"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RockedError::io(&path, e)),
        }
        let socket = UnixDatagram::bind(&path).map_err(|e| RockedError::io(&path, e))?;
        tracing::info!(path = %path.display(), "waiting for processes");
        Ok(Self { path, socket })
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove endpoint");
            }
        }
    }
}

/// Runs the supervisor until the tracked set is done.
///
/// # Errors
///
/// Returns [`RockedError::Io`] if receiving from the socket fails.
pub async fn serve<R, T>(
    endpoint: &Endpoint,
    relay: &mut R,
    mut terminations: T,
    policy: DrainPolicy,
) -> Result<()>
where
    R: SignalRelay,
    T: TerminationSource,
{
    let mut tracker = Tracker::new(policy.max_ticks);
    let mut watchdog = time::interval(policy.interval);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut terminations_open = true;
    // Oversized so that long datagrams are seen whole and rejected.
    let mut buf = [0u8; DATAGRAM_LEN * 4];

    loop {
        let armed = tracker.watchdog_armed();
        let action = tokio::select! {
            received = endpoint.socket.recv(&mut buf) => {
                let n = received.map_err(|e| RockedError::io(&endpoint.path, e))?;
                match Request::decode(&buf[..n]) {
                    Ok(request) => tracker.apply(request),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed datagram");
                        None
                    }
                }
            }
            event = terminations.recv(), if terminations_open => {
                if event.is_some() {
                    let action = tracker.terminate();
                    if action.is_some() {
                        watchdog.reset();
                    }
                    action
                } else {
                    terminations_open = false;
                    None
                }
            }
            _ = watchdog.tick(), if armed => tracker.tick(),
        };

        match action {
            Some(Action::Relay { signal, pids }) => relay.relay(signal, &pids),
            Some(Action::Exit) => break,
            None => {}
        }
    }
    tracing::info!("all processes closed");
    Ok(())
}
