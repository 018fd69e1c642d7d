//! Check command implementation
//!
//! Implements `texpipe check` to validate the toolchain and confirm every
//! step's executable can be found.

use std::path::Path;

use anyhow::{bail, Context, Result};

use super::{load_settings, locate_document, CommandContext};
use crate::cli::output::status;
use crate::core::toolchain::resolve_toolchain;

/// Execute the check command
pub fn execute(context: &CommandContext, file: &Path) -> Result<()> {
    let root_file = locate_document(file)?;
    let settings = load_settings(context, &root_file)?;
    let toolchain = resolve_toolchain(&root_file, &settings.toolchain)
        .with_context(|| format!("Invalid toolchain for {}", root_file.display()))?;

    let mut missing = Vec::new();
    for step in &toolchain.steps {
        match which::which(&step.command) {
            Ok(path) => println!("{} {} ({})", status::SUCCESS, step.command, path.display()),
            Err(_) => {
                println!("{} {} not found on PATH", status::ERROR, step.command);
                missing.push(step.command.clone());
            }
        }
    }

    if !missing.is_empty() {
        bail!("Missing executables: {}", missing.join(", "));
    }
    println!("{} Toolchain of {} steps is ready", status::SUCCESS, toolchain.len());
    Ok(())
}
