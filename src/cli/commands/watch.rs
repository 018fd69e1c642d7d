//! Watch command implementation
//!
//! Implements `texpipe watch`: builds once, then requests a new build
//! whenever a source file in the document's directory changes. Builds that
//! overlap are coalesced by the orchestrator.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use super::{collaborators, load_settings, locate_document, CommandContext};
use crate::cli::output::ConsoleLogger;
use crate::config::defaults::{WATCH_DEBOUNCE_MS, WATCH_EXTENSIONS};
use crate::core::orchestrator::{BuildEvent, BuildOrchestrator};
use crate::core::toolchain::document_dir;

/// Whether a filesystem event should trigger a rebuild
pub fn is_source_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| WATCH_EXTENSIONS.contains(&ext))
        })
}

/// Execute the watch command
pub async fn execute(context: &CommandContext, file: &Path) -> Result<()> {
    let root_file = locate_document(file)?;
    // Fail before starting when the settings are unreadable.
    load_settings(context, &root_file)?;
    let watch_dir = document_dir(&root_file);

    let logger = Arc::new(ConsoleLogger::new(context.output()));
    let handle = BuildOrchestrator::spawn(
        Arc::new(context.settings_source()),
        collaborators(logger.clone()),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_source_change(&event) => {
            let _ = tx.send(event);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Watch error: {e}"),
    })
    .context("Failed to create file watcher")?;
    watcher
        .watch(&watch_dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    tracing::info!("Watching {} for changes", watch_dir.display());
    let mut events = handle.subscribe();
    handle.build(root_file.clone())?;

    loop {
        tokio::select! {
            change = rx.recv() => {
                let Some(change) = change else { break };
                tokio::time::sleep(Duration::from_millis(WATCH_DEBOUNCE_MS)).await;
                while rx.try_recv().is_ok() {}

                if handle.saves_suppressed() {
                    tracing::debug!("Ignoring change during save: {:?}", change.paths);
                    continue;
                }
                tracing::info!("Change detected: {:?}", change.paths);
                handle.build(root_file.clone())?;
            }
            event = events.recv() => match event {
                Ok(BuildEvent::Failed { reason, .. }) => tracing::warn!("Build failed: {reason}"),
                Err(broadcast::error::RecvError::Closed) => break,
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    logger.finish();
    Ok(())
}
