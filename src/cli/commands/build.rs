//! Build command implementation
//!
//! Implements `texpipe build` to run the toolchain once and report the result.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::{collaborators, load_settings, locate_document, CommandContext};
use crate::cli::output::ConsoleLogger;
use crate::core::orchestrator::{BuildEvent, BuildOrchestrator};

/// Execute the build command
pub async fn execute(context: &CommandContext, file: &Path) -> Result<()> {
    let root_file = locate_document(file)?;
    // Fail before starting when the settings are unreadable.
    load_settings(context, &root_file)?;

    let logger = Arc::new(ConsoleLogger::new(context.output()));
    let handle = BuildOrchestrator::spawn(
        Arc::new(context.settings_source()),
        collaborators(logger.clone()),
    );

    let result = handle.build_and_wait(root_file.clone()).await;
    handle.shutdown();
    logger.finish();

    match result? {
        BuildEvent::Succeeded { .. } => Ok(()),
        BuildEvent::Failed { reason, .. } => bail!("Build of {} failed: {reason}", root_file.display()),
        other => bail!("Build of {} ended unexpectedly: {other:?}", root_file.display()),
    }
}
