//! Tracked process set and supervisor state machine.
//!
//! The tracker is pure: it never touches processes or sockets. Each input
//! returns the [`Action`] the caller must perform, which keeps the
//! Idle → Active → Draining → Terminated transitions testable without a
//! running system.

use std::collections::BTreeSet;
use std::time::Duration;

use nix::sys::signal::Signal;
use rocked_common::constants::{DRAIN_INTERVAL, DRAIN_TICKS};

use crate::protocol::Request;

/// Watchdog timing while draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Time between two watchdog checks.
    pub interval: Duration,
    /// Checks before escalating to SIGKILL.
    pub max_ticks: u32,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            interval: DRAIN_INTERVAL,
            max_ticks: DRAIN_TICKS,
        }
    }
}

/// Supervisor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing registered yet.
    Idle,
    /// At least one process registered.
    Active,
    /// Termination requested; waiting for tracked processes to exit.
    Draining,
    /// Done; the supervisor exits.
    Terminated,
}

/// Side effect requested by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `signal` to the children of every pid in `pids`.
    Relay {
        /// Signal to deliver.
        signal: Signal,
        /// Tracked pids whose children receive the signal.
        pids: Vec<u32>,
    },
    /// Shut the supervisor down.
    Exit,
}

/// Set of registered process ids plus the supervisor phase.
#[derive(Debug, Clone)]
pub struct Tracker {
    pids: BTreeSet<u32>,
    phase: Phase,
    ticks: u32,
    escalated: bool,
    max_ticks: u32,
}

impl Tracker {
    /// Creates an idle tracker escalating after `max_ticks` watchdog ticks.
    #[must_use]
    pub const fn new(max_ticks: u32) -> Self {
        Self {
            pids: BTreeSet::new(),
            phase: Phase::Idle,
            ticks: 0,
            escalated: false,
            max_ticks,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the number of tracked processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// Returns whether no process is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Returns whether the watchdog should be ticking.
    #[must_use]
    pub fn watchdog_armed(&self) -> bool {
        self.phase == Phase::Draining && !self.escalated
    }

    /// Applies a decoded registration request.
    pub fn apply(&mut self, request: Request) -> Option<Action> {
        match request {
            Request::Add(pid) => {
                self.add(u32::from(pid));
                None
            }
            Request::Remove(pid) => self.remove(u32::from(pid)),
        }
    }

    /// Starts tracking `pid`; tracking twice is a no-op.
    ///
    /// While draining, the pid is tracked but the deadline is unchanged.
    pub fn add(&mut self, pid: u32) {
        match self.phase {
            Phase::Terminated => {
                tracing::debug!(pid, "supervisor terminated, add ignored");
                return;
            }
            Phase::Idle => self.phase = Phase::Active,
            Phase::Active | Phase::Draining => {}
        }
        if self.pids.insert(pid) {
            tracing::info!(pid, tracked = ?self.pids, "process added");
        }
    }

    /// Stops tracking `pid`.
    ///
    /// An empty set terminates the supervisor, except during the drain
    /// window where the watchdog decides. Before the first add there is
    /// nothing to remove and the request is ignored.
    pub fn remove(&mut self, pid: u32) -> Option<Action> {
        match self.phase {
            Phase::Terminated => return None,
            Phase::Idle => {
                tracing::debug!(pid, "nothing tracked yet, remove ignored");
                return None;
            }
            Phase::Active | Phase::Draining => {}
        }
        if self.pids.remove(&pid) {
            tracing::info!(pid, tracked = ?self.pids, "process removed");
        }
        if self.pids.is_empty() && !self.watchdog_armed() {
            return Some(self.finish());
        }
        None
    }

    /// Handles a termination request.
    ///
    /// Only the first request starts a drain; SIGTERM is relayed once.
    pub fn terminate(&mut self) -> Option<Action> {
        match self.phase {
            Phase::Draining | Phase::Terminated => None,
            Phase::Idle | Phase::Active => {
                self.phase = Phase::Draining;
                self.ticks = 0;
                tracing::info!(tracked = ?self.pids, "termination requested, draining");
                Some(self.relay(Signal::SIGTERM))
            }
        }
    }

    /// Advances the drain watchdog by one tick.
    pub fn tick(&mut self) -> Option<Action> {
        if !self.watchdog_armed() {
            return None;
        }
        self.ticks += 1;
        if self.pids.is_empty() {
            return Some(self.finish());
        }
        if self.ticks >= self.max_ticks {
            self.escalated = true;
            tracing::warn!(tracked = ?self.pids, "drain deadline elapsed, escalating");
            return Some(self.relay(Signal::SIGKILL));
        }
        None
    }

    fn relay(&self, signal: Signal) -> Action {
        Action::Relay {
            signal,
            pids: self.pids.iter().copied().collect(),
        }
    }

    fn finish(&mut self) -> Action {
        self.phase = Phase::Terminated;
        tracing::info!("no tracked process left");
        Action::Exit
    }
}
