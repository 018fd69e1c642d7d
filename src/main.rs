//! Texpipe CLI - LaTeX build orchestrator
//!
//! Entry point for the texpipe command-line application.

use anyhow::Result;
use clap::Parser;

use texpipe::cli::output::status;
use texpipe::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    // Run the command and handle errors
    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {e:#}", status::ERROR);
            std::process::exit(1);
        }
    }
}
