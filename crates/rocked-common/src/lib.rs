//! # rocked-common
//!
//! Config file model, settings resolution, the shared error enum, container
//! and image identities, and the naming constants every rocked crate agrees on.
//!
//! No other internal crate is a dependency.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod settings;
pub mod types;
