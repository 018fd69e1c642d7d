//! Output formatting and progress indicators
//!
//! This module provides the console build log: a spinner while steps run,
//! prefixed status lines, and optional echo of raw compiler output.

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::collaborators::{BuildLogger, Severity, StatusIcon, StatusUpdate};

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow warning sign)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Console output settings
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Only print errors
    pub quiet: bool,
    /// Echo raw compiler output
    pub echo_output: bool,
}

impl OutputConfig {
    /// Derive output settings from the global flags
    pub fn new(quiet: bool, verbose: u8) -> Self {
        Self {
            quiet,
            echo_output: !quiet && verbose > 0,
        }
    }
}

/// Build log printed to the terminal
#[derive(Debug)]
pub struct ConsoleLogger {
    config: OutputConfig,
    spinner: Option<ProgressBar>,
}

impl ConsoleLogger {
    /// Create a console logger
    ///
    /// A spinner is shown unless output is quiet or compiler output is echoed.
    pub fn new(config: OutputConfig) -> Self {
        let spinner = (!config.quiet && !config.echo_output).then(|| create_spinner("Waiting"));
        Self { config, spinner }
    }

    fn println(&self, line: &str) {
        match &self.spinner {
            Some(pb) => pb.println(line),
            None => eprintln!("{line}"),
        }
    }

    /// Stop the spinner
    pub fn finish(&self) {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
    }
}

impl BuildLogger for ConsoleLogger {
    fn log(&self, line: &str) {
        tracing::debug!("{line}");
        if !self.config.quiet {
            self.println(&format!("{} {line}", status::INFO));
        }
    }

    fn compiler_output(&self, chunk: &str) {
        if self.config.echo_output {
            print!("{chunk}");
        }
    }

    fn clear_diagnostics(&self) {}

    fn display_status(&self, update: &StatusUpdate) {
        let message = update.message.as_deref().unwrap_or_default();
        match update.icon {
            StatusIcon::Running => {
                if let Some(pb) = &self.spinner {
                    pb.set_message(if message.is_empty() { "Building" } else { "Retrying" });
                }
                if update.severity == Some(Severity::Warning) && !self.config.quiet {
                    self.println(&format!("{} {message}", status::WARNING));
                }
            }
            StatusIcon::Succeeded => {
                if !self.config.quiet {
                    self.println(&format!("{} {message}", status::SUCCESS));
                }
            }
            StatusIcon::Failed => self.println(&format!("{} {message}", status::ERROR)),
        }
    }
}
