//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: temporary
//! projects, recording collaborators, and an orchestrator harness.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{broadcast, Notify};

use texpipe::core::collaborators::{
    BuildLogger, Cleaner, Collaborators, DocumentStore, LogParser, StatusUpdate, Viewer,
};
use texpipe::core::orchestrator::{BuildEvent, BuildHandle, BuildOrchestrator};
use texpipe::core::settings::{BuildSettings, SettingsSource};
use texpipe::error::SettingsError;
use texpipe::core::toolchain::StepTemplate;

/// How long a test waits for a single build event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project and return its path
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal LaTeX document
pub const SAMPLE_DOCUMENT: &str = r"\documentclass{article}
\begin{document}
Hello.
\end{document}
";

/// A step running a shell script
pub fn sh_step(script: &str) -> StepTemplate {
    StepTemplate::new("sh", ["-c", script])
}

/// Settings with the given steps, retry on, clean mode off
pub fn settings_with(steps: Vec<StepTemplate>) -> BuildSettings {
    BuildSettings {
        toolchain: steps,
        clean_and_retry: true,
        clean_enabled: false,
        ..BuildSettings::default()
    }
}

/// Build log that records everything it is given
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<String>>,
    pub output: Mutex<String>,
    pub statuses: Mutex<Vec<StatusUpdate>>,
    pub clears: AtomicUsize,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<StatusUpdate> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

impl BuildLogger for RecordingLogger {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn compiler_output(&self, chunk: &str) {
        self.output.lock().unwrap().push_str(chunk);
    }

    fn clear_diagnostics(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn display_status(&self, status: &StatusUpdate) {
        self.statuses.lock().unwrap().push(status.clone());
    }
}

/// Parser that keeps every stdout it is handed
#[derive(Default)]
pub struct RecordingParser {
    pub parsed: Mutex<Vec<String>>,
}

impl RecordingParser {
    pub fn parsed(&self) -> Vec<String> {
        self.parsed.lock().unwrap().clone()
    }
}

impl LogParser for RecordingParser {
    fn parse(&self, stdout: &str) {
        self.parsed.lock().unwrap().push(stdout.to_string());
    }
}

/// Cleaner that counts calls and drops a marker file next to the document
///
/// Records the clean command of each snapshot it is handed. With
/// `hold_first` set, the first clean waits until that `Notify` fires.
#[derive(Default)]
pub struct MarkerCleaner {
    pub calls: AtomicUsize,
    pub marker: Option<String>,
    pub hold_first: Option<Arc<Notify>>,
    pub commands: Mutex<Vec<String>>,
}

impl MarkerCleaner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cleaner for MarkerCleaner {
    async fn clean(&self, root_file: &Path, settings: &BuildSettings) -> io::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands
            .lock()
            .unwrap()
            .push(settings.clean.command.clone());
        if let (0, Some(gate)) = (call, &self.hold_first) {
            gate.notified().await;
        }
        if let (Some(marker), Some(dir)) = (&self.marker, root_file.parent()) {
            tokio::fs::write(dir.join(marker), "cleaned").await?;
        }
        Ok(())
    }
}

/// Viewer that records refresh requests
#[derive(Default)]
pub struct RecordingViewer {
    pub refreshed: Mutex<Vec<PathBuf>>,
}

impl RecordingViewer {
    pub fn refreshed(&self) -> Vec<PathBuf> {
        self.refreshed.lock().unwrap().clone()
    }
}

impl Viewer for RecordingViewer {
    fn refresh(&self, root_file: &Path, _settings: &BuildSettings) {
        self.refreshed.lock().unwrap().push(root_file.to_path_buf());
    }
}

/// Document store that counts flushes
#[derive(Default)]
pub struct CountingDocuments {
    pub saves: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingDocuments {
    async fn save_all(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settings that can be swapped between builds
pub struct SharedSettings(pub Mutex<BuildSettings>);

impl SharedSettings {
    pub fn new(settings: BuildSettings) -> Self {
        Self(Mutex::new(settings))
    }

    pub fn update(&self, change: impl FnOnce(&mut BuildSettings)) {
        change(&mut self.0.lock().unwrap());
    }
}

impl SettingsSource for SharedSettings {
    fn snapshot(&self, _root_file: &Path) -> Result<BuildSettings, SettingsError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// A running orchestrator with recording collaborators
pub struct Harness {
    pub handle: BuildHandle,
    pub events: broadcast::Receiver<BuildEvent>,
    pub logger: Arc<RecordingLogger>,
    pub parser: Arc<RecordingParser>,
    pub cleaner: Arc<MarkerCleaner>,
    pub viewer: Arc<RecordingViewer>,
    pub documents: Arc<CountingDocuments>,
}

impl Harness {
    /// Start an orchestrator with fixed settings
    pub fn start(settings: BuildSettings) -> Self {
        Self::start_with_cleaner(settings, MarkerCleaner::default())
    }

    /// Start an orchestrator with fixed settings and a custom cleaner
    pub fn start_with_cleaner(settings: BuildSettings, cleaner: MarkerCleaner) -> Self {
        Self::start_with_source(Arc::new(settings), cleaner)
    }

    /// Start an orchestrator reading settings from `source`
    pub fn start_with_source(source: Arc<dyn SettingsSource>, cleaner: MarkerCleaner) -> Self {
        let logger = Arc::new(RecordingLogger::default());
        let parser = Arc::new(RecordingParser::default());
        let cleaner = Arc::new(cleaner);
        let viewer = Arc::new(RecordingViewer::default());
        let documents = Arc::new(CountingDocuments::default());

        let collaborators = Collaborators {
            logger: logger.clone(),
            parser: parser.clone(),
            cleaner: cleaner.clone(),
            viewer: viewer.clone(),
            documents: documents.clone(),
        };
        let handle = BuildOrchestrator::spawn(source, collaborators);
        let events = handle.subscribe();

        Self {
            handle,
            events,
            logger,
            parser,
            cleaner,
            viewer,
            documents,
        }
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> BuildEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("Timed out waiting for a build event")
            .expect("Build event channel closed")
    }

    /// Collect events until `root_file` succeeds or fails
    pub async fn run_until_done(&mut self, root_file: &Path) -> Vec<BuildEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = matches!(
                &event,
                BuildEvent::Succeeded { .. } | BuildEvent::Failed { .. }
            ) && event.root_file() == root_file;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Wait until a step of `root_file` has started
    pub async fn wait_for_step(&mut self, root_file: &Path, step: usize) {
        loop {
            if let BuildEvent::StepStarted {
                root_file: started,
                index,
                ..
            } = self.next_event().await
            {
                if started == root_file && index == step {
                    return;
                }
            }
        }
    }

    /// Wait until the orchestrator has taken `count` build requests
    ///
    /// Every request saves the documents first, so this shows a request was
    /// handled even when it was only parked.
    pub async fn wait_for_saves(&self, count: usize) {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while self.documents.saves.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Timed out waiting for a build request to be handled");
    }

    /// Collect events until `want` matches one, returning all of them
    pub async fn events_until(&mut self, want: impl Fn(&BuildEvent) -> bool) -> Vec<BuildEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = want(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

/// Indices of the steps started in an event list
pub fn started_steps(events: &[BuildEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            BuildEvent::StepStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}
