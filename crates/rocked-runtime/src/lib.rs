//! Container orchestration for rocked.
//!
//! The [`orchestrator::Orchestrator`] drives a [`backend::ContainerRuntime`]
//! through the lifecycle of one profile's containers and images.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod allocate;
pub mod backend;
pub mod display;
pub mod exec;
pub mod orchestrator;
pub mod runspec;
