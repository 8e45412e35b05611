//! In-container process supervisor.
//!
//! `rocked-monitor` is the command of every rocked container. Processes
//! started through `rocked exec` register with it over a Unix datagram
//! socket (`rocked-report add`/`remove`). The container lives as long as
//! at least one registered process does; on SIGTERM the supervisor relays
//! the signal to the registered process trees and escalates to SIGKILL if
//! they do not exit in time.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod protocol;
pub mod relay;
pub mod reporter;
pub mod server;
pub mod tracked;
