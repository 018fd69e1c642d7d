//! Texpipe - LaTeX build orchestrator
//!
//! This library drives a configurable, multi-step command pipeline (a
//! toolchain) against a LaTeX document, supervising one child process at a
//! time and deciding after each step whether to continue, retry after
//! cleaning, give up, or restart because a newer build was requested.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Toolchain resolution and the build state machine
//! - [`infra`] - Infrastructure layer (child processes, command adapters)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
