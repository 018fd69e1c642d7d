//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod toolchain;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::cli::output::{ConsoleLogger, OutputConfig};
use crate::core::collaborators::Collaborators;
use crate::core::settings::{BuildSettings, FileSettings, SettingsSource};
use crate::infra::adapters::{CommandCleaner, CommandViewer, NoopDocuments, TracingParser};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a document once
    Build {
        /// Root document
        file: PathBuf,
    },

    /// Build a document and rebuild whenever its sources change
    Watch {
        /// Root document
        file: PathBuf,
    },

    /// Print the resolved toolchain for a document
    Toolchain {
        /// Root document
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the toolchain and look up its executables
    Check {
        /// Root document
        file: PathBuf,
    },
}

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Verbosity count
    pub verbose: u8,
    /// Quiet mode
    pub quiet: bool,
    /// Explicit project settings file
    pub config: Option<PathBuf>,
}

impl CommandContext {
    /// Settings source honouring `--config`
    pub fn settings_source(&self) -> FileSettings {
        let source = FileSettings::new();
        match &self.config {
            Some(path) => source.with_project_path(path.clone()),
            None => source,
        }
    }

    /// Console output settings
    pub fn output(&self) -> OutputConfig {
        OutputConfig::new(self.quiet, self.verbose)
    }
}

impl Commands {
    /// Execute the command
    pub async fn run(self, context: &CommandContext) -> Result<()> {
        match self {
            Self::Build { file } => build::execute(context, &file).await,
            Self::Watch { file } => watch::execute(context, &file).await,
            Self::Toolchain { file, json } => toolchain::execute(context, &file, json),
            Self::Check { file } => check::execute(context, &file),
        }
    }
}

/// Canonicalize the root document, failing early when it is missing
pub fn locate_document(file: &Path) -> Result<PathBuf> {
    if !file.is_file() {
        bail!("Document not found: {}", file.display());
    }
    file.canonicalize()
        .with_context(|| format!("Failed to resolve path {}", file.display()))
}

/// Load the settings snapshot for a document
pub fn load_settings(context: &CommandContext, root_file: &Path) -> Result<BuildSettings> {
    context
        .settings_source()
        .snapshot(root_file)
        .with_context(|| format!("Failed to load settings for {}", root_file.display()))
}

/// Wire the command-backed collaborators
///
/// The cleaner and viewer read their commands from each build's settings.
pub fn collaborators(logger: Arc<ConsoleLogger>) -> Collaborators {
    Collaborators {
        logger,
        parser: Arc::new(TracingParser),
        cleaner: Arc::new(CommandCleaner),
        viewer: Arc::new(CommandViewer),
        documents: Arc::new(NoopDocuments),
    }
}
