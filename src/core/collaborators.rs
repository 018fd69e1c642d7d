//! Interfaces to the systems a build talks to
//!
//! The orchestrator drives processes itself but relies on outside
//! collaborators for everything user-facing: the build log and status
//! display, the diagnostic parser, the auxiliary-file cleaner, the document
//! viewer, and the editor's unsaved buffers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::settings::BuildSettings;
use crate::infra::process::{OutputSink, OutputStream};

/// Icon shown with a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    /// A step is running
    Running,
    /// The toolchain finished
    Succeeded,
    /// The build ended with an error
    Failed,
}

impl StatusIcon {
    /// Icon identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusIcon::Running => "sync~spin",
            StatusIcon::Succeeded => "check",
            StatusIcon::Failed => "x",
        }
    }
}

/// Severity attached to a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error, shown persistently
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A status display request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Icon
    pub icon: StatusIcon,
    /// Color class used to render the status
    pub color: &'static str,
    /// Optional message
    pub message: Option<String>,
    /// Optional severity
    pub severity: Option<Severity>,
}

impl StatusUpdate {
    /// A step is in progress
    pub fn running() -> Self {
        Self {
            icon: StatusIcon::Running,
            color: "statusBar.foreground",
            message: None,
            severity: None,
        }
    }

    /// The toolchain succeeded
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            icon: StatusIcon::Succeeded,
            color: "statusBar.foreground",
            message: Some(message.into()),
            severity: None,
        }
    }

    /// A step failed and the build is being retried after cleaning
    pub fn retrying(message: impl Into<String>) -> Self {
        Self {
            icon: StatusIcon::Running,
            color: "editorWarning.foreground",
            message: Some(message.into()),
            severity: Some(Severity::Warning),
        }
    }

    /// The build ended with an error
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            icon: StatusIcon::Failed,
            color: "errorForeground",
            message: Some(message.into()),
            severity: Some(Severity::Error),
        }
    }
}

/// User-facing build log
pub trait BuildLogger: Send + Sync {
    /// Append a free-text log line
    fn log(&self, line: &str);

    /// Append a raw chunk of compiler output
    fn compiler_output(&self, chunk: &str);

    /// Clear previously displayed diagnostics
    fn clear_diagnostics(&self);

    /// Display a status
    fn display_status(&self, status: &StatusUpdate);
}

/// Diagnostic extraction from captured compiler output
pub trait LogParser: Send + Sync {
    /// Parse the full stdout of one step
    fn parse(&self, stdout: &str);
}

/// Auxiliary-file cleaner
#[async_trait]
pub trait Cleaner: Send + Sync {
    /// Clean the build products of `root_file`
    ///
    /// `settings` is the snapshot of the build that asked for the clean.
    async fn clean(&self, root_file: &Path, settings: &BuildSettings) -> std::io::Result<()>;
}

/// Document viewer
pub trait Viewer: Send + Sync {
    /// Refresh the view of `root_file`'s output
    fn refresh(&self, root_file: &Path, settings: &BuildSettings);
}

/// The editor's open documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write all unsaved buffers to disk
    async fn save_all(&self);
}

/// Everything a build needs from the outside
#[derive(Clone)]
pub struct Collaborators {
    /// Build log and status display
    pub logger: Arc<dyn BuildLogger>,
    /// Diagnostic parser
    pub parser: Arc<dyn LogParser>,
    /// Auxiliary-file cleaner
    pub cleaner: Arc<dyn Cleaner>,
    /// Document viewer
    pub viewer: Arc<dyn Viewer>,
    /// Unsaved buffers
    pub documents: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Forwards process output to the build log
pub struct LoggerSink(pub Arc<dyn BuildLogger>);

impl OutputSink for LoggerSink {
    fn chunk(&self, _stream: OutputStream, text: &str) {
        self.0.compiler_output(text);
    }
}
