//! Core build logic
//!
//! # Submodules
//!
//! - [`magic`] - Magic directive detection
//! - [`toolchain`] - Toolchain validation, macro expansion, and program override
//! - [`settings`] - Settings files and per-build snapshots
//! - [`collaborators`] - Interfaces to the log, parser, cleaner, viewer, and editor
//! - [`orchestrator`] - The build state machine

pub mod collaborators;
pub mod magic;
pub mod orchestrator;
pub mod settings;
pub mod toolchain;
