//! Toolchain command implementation
//!
//! Implements `texpipe toolchain` to show the commands a build would run.

use std::path::Path;

use anyhow::{Context, Result};

use super::{load_settings, locate_document, CommandContext};
use crate::core::toolchain::resolve_toolchain;

/// Execute the toolchain command
pub fn execute(context: &CommandContext, file: &Path, json: bool) -> Result<()> {
    let root_file = locate_document(file)?;
    let settings = load_settings(context, &root_file)?;
    let toolchain = resolve_toolchain(&root_file, &settings.toolchain)
        .with_context(|| format!("Invalid toolchain for {}", root_file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&toolchain)?);
        return Ok(());
    }

    println!("Program: {}", toolchain.program);
    for (index, step) in toolchain.steps.iter().enumerate() {
        println!("{:>3}. {step}", index + 1);
    }
    Ok(())
}
