//! Command-backed collaborators
//!
//! Outside an editor there are no unsaved buffers, no diagnostics panel and
//! no embedded viewer. These adapters fill those roles for the command-line
//! front end by running configured external commands.

use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::collaborators::{Cleaner, DocumentStore, LogParser, Viewer};
use crate::core::settings::{BuildSettings, CommandConfig};
use crate::core::toolchain::{document_dir, substitute_macros, DocumentMacros};

fn expand_args(config: &CommandConfig, root_file: &Path) -> Vec<String> {
    let macros = DocumentMacros::for_document(root_file);
    config
        .args
        .iter()
        .map(|arg| substitute_macros(arg, &macros))
        .collect()
}

/// Cleans by running the configured clean command, `latexmk -c` by default
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCleaner;

#[async_trait]
impl Cleaner for CommandCleaner {
    async fn clean(&self, root_file: &Path, settings: &BuildSettings) -> io::Result<()> {
        let config = &settings.clean;
        let args = expand_args(config, root_file);
        tracing::info!("Cleaning: {} {}", config.command, args.join(" "));

        let output = Command::new(&config.command)
            .args(&args)
            .current_dir(document_dir(root_file))
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "'{}' exited with {}: {}",
                config.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Refreshes the viewer by launching the configured viewer command
///
/// Without one it only reports where the output is.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandViewer;

impl Viewer for CommandViewer {
    fn refresh(&self, root_file: &Path, settings: &BuildSettings) {
        let Some(config) = &settings.viewer else {
            tracing::info!("Output ready: {}", root_file.with_extension("pdf").display());
            return;
        };

        let args = expand_args(config, root_file);
        let spawned = Command::new(&config.command)
            .args(&args)
            .current_dir(document_dir(root_file))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::warn!("Failed to launch viewer '{}': {e}", config.command);
        }
    }
}

/// Parser that only records how much output each step produced
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingParser;

impl LogParser for TracingParser {
    fn parse(&self, stdout: &str) {
        tracing::debug!(
            bytes = stdout.len(),
            lines = stdout.lines().count(),
            "captured step output"
        );
    }
}

/// Document store for a front end without editor buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDocuments;

#[async_trait]
impl DocumentStore for NoopDocuments {
    async fn save_all(&self) {}
}
