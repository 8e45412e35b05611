//! # rocked-image
//!
//! Image building for rocked profiles.
//!
//! Handles:
//! - **Layers**: the fixed vital-layer prefix, profile layers, entry point and password layer.
//! - **Rendering**: template substitution against the `{settings, profile}` context.
//! - **Context**: staging support files and scoped build files in the build directory.
//! - **Build log**: scanning the runtime's log stream for the built image id.
//! - **Builder**: the pipeline tying the above to a [`builder::BuildBackend`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod buildlog;
pub mod builder;
pub mod context;
pub mod layer;
pub mod render;
