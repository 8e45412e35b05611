//! Signal delivery to the process trees of tracked pids.
//!
//! A tracked pid is the reporter wrapper, not the workload itself, so
//! signals go to its direct children.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::System;

/// Delivers a signal on behalf of the supervisor.
pub trait SignalRelay {
    /// Sends `signal` to the children of every pid in `pids`.
    fn relay(&mut self, signal: Signal, pids: &[u32]);
}

/// Relay backed by a live process table.
pub struct ChildrenRelay {
    system: System,
}

impl ChildrenRelay {
    /// Creates a relay with an empty process snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for ChildrenRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the pids whose parent is `parent`, in ascending order.
pub fn children_of<I>(processes: I, parent: u32) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, Option<u32>)>,
{
    let mut children: Vec<u32> = processes
        .into_iter()
        .filter(|&(_, ppid)| ppid == Some(parent))
        .map(|(pid, _)| pid)
        .collect();
    children.sort_unstable();
    children
}

impl SignalRelay for ChildrenRelay {
    fn relay(&mut self, signal: Signal, pids: &[u32]) {
        self.system.refresh_processes();
        tracing::info!(signal = %signal, tracked = ?pids, "relaying signal");
        for &pid in pids {
            if self.system.process(sysinfo::Pid::from_u32(pid)).is_none() {
                tracing::warn!(pid, "tracked process vanished, skipped");
                continue;
            }
            let table = self
                .system
                .processes()
                .iter()
                .map(|(child, process)| (child.as_u32(), process.parent().map(sysinfo::Pid::as_u32)));
            for child in children_of(table, pid) {
                let Ok(raw) = i32::try_from(child) else {
                    continue;
                };
                if let Err(e) = signal::kill(Pid::from_raw(raw), signal) {
                    tracing::warn!(pid = child, signal = %signal, error = %e, "signal delivery failed");
                }
            }
        }
    }
}
