//! Error types for texpipe
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Toolchain configuration errors
///
/// Raised while validating the configured step templates, before any
/// substitution happens or any process is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolchainError {
    /// Step has no `command` field
    #[error("Toolchain step {index} has no 'command' field")]
    MissingCommand { index: usize },

    /// Step `args` is not an array of strings
    #[error("Toolchain step {index} has invalid 'args': expected an array of strings, got {found}")]
    InvalidArgs { index: usize, found: String },

    /// Document could not be read for magic directive detection
    #[error("Failed to read document '{path}': {error}")]
    ReadDocument { path: PathBuf, error: String },
}

/// Settings loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Failed to read settings file
    #[error("Failed to read settings file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse settings file
    #[error("Failed to parse settings file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Process supervision errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The supervisor already owns a live process
    #[error("A process is already running: {command}")]
    AlreadyRunning { command: String },
}

/// Build request errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// The orchestrator task is gone
    #[error("Build orchestrator is not running")]
    OrchestratorStopped,
}
