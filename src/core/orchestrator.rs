//! Build orchestration
//!
//! The orchestrator is a single task that owns every piece of build state.
//! Requests reach it through a [`BuildHandle`]; it runs the toolchain steps
//! one after another, retries once after cleaning when a step fails, and
//! restarts from scratch when a newer build is requested mid-build.
//!
//! # Preemption
//!
//! A request that arrives while a build is in flight kills the current
//! process and is parked as the pending rebuild target. Only the most recent
//! target is kept. When the killed process reports back, the old session is
//! dropped and a fresh build starts for the pending target.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, watch};

use crate::core::collaborators::{Collaborators, LoggerSink, StatusUpdate};
use crate::core::magic;
use crate::core::settings::{BuildSettings, SettingsSource};
use crate::core::toolchain::{document_dir, resolve_toolchain, ResolvedToolchain, ToolchainStep};
use crate::error::BuildError;
use crate::infra::process::{ProcessCompletion, ProcessOutcome, ProcessSpec, ProcessSupervisor};

const EVENT_CAPACITY: usize = 256;

/// Where the orchestrator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Nothing to do
    Idle,
    /// Flushing unsaved documents before a build
    Preprocessing,
    /// Running the step at this index
    RunningStep(usize),
    /// Cleaning before retrying the toolchain
    CleanAndRetry,
    /// Cleaning after a successful build
    Cleaning,
}

/// Why a build ended without success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Settings could not be loaded
    Settings(String),
    /// The toolchain is malformed or the document unreadable
    InvalidToolchain(String),
    /// A step could not be launched
    Fatal(String),
    /// A step exited unsuccessfully
    StepFailed {
        /// Index of the failing step
        index: usize,
        /// Its exit code, absent when killed
        code: Option<i32>,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Settings(e) | FailureReason::InvalidToolchain(e) => write!(f, "{e}"),
            FailureReason::Fatal(e) => write!(f, "Recipe terminated with fatal error: {e}."),
            FailureReason::StepFailed { .. } => write!(f, "Recipe terminated with error."),
        }
    }
}

/// Observable build lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A new build session began
    SessionStarted { root_file: PathBuf },
    /// A step was launched
    StepStarted {
        root_file: PathBuf,
        index: usize,
        step: ToolchainStep,
    },
    /// A failed step triggered the one-shot clean and retry
    Retrying { root_file: PathBuf },
    /// The cleaner finished
    Cleaned { root_file: PathBuf },
    /// The session was superseded by a newer request
    Preempted { root_file: PathBuf, next: PathBuf },
    /// Every step succeeded
    Succeeded { root_file: PathBuf },
    /// The build ended with an error
    Failed {
        root_file: PathBuf,
        reason: FailureReason,
    },
}

impl BuildEvent {
    /// Document the event belongs to
    pub fn root_file(&self) -> &Path {
        match self {
            BuildEvent::SessionStarted { root_file }
            | BuildEvent::StepStarted { root_file, .. }
            | BuildEvent::Retrying { root_file }
            | BuildEvent::Cleaned { root_file }
            | BuildEvent::Preempted { root_file, .. }
            | BuildEvent::Succeeded { root_file }
            | BuildEvent::Failed { root_file, .. } => root_file,
        }
    }

    /// Whether the event ends a session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildEvent::Succeeded { .. } | BuildEvent::Failed { .. } | BuildEvent::Preempted { .. }
        )
    }
}

/// State of the build in progress
#[derive(Debug, Clone)]
pub struct BuildSession {
    /// Document being built
    pub root_file: PathBuf,
    /// Settings captured when the build started
    pub settings: BuildSettings,
    /// Steps resolved for this document
    pub toolchain: ResolvedToolchain,
    /// Index of the current step
    pub step: usize,
    /// Set once the clean-and-retry has been used
    pub disable_clean_and_retry: bool,
}

impl BuildSession {
    /// Directory the steps run in
    pub fn working_dir(&self) -> PathBuf {
        document_dir(&self.root_file)
    }
}

#[derive(Debug)]
enum Request {
    Build(PathBuf),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum CleanPurpose {
    Retry,
    AfterSuccess,
}

enum Waiting {
    Step(ProcessCompletion),
    Clean {
        purpose: CleanPurpose,
        root_file: PathBuf,
        future: BoxFuture<'static, io::Result<()>>,
    },
}

enum Completed {
    Step(ProcessOutcome),
    Clean {
        purpose: CleanPurpose,
        root_file: PathBuf,
        result: io::Result<()>,
    },
}

async fn wait_for(waiting: &mut Option<Waiting>) -> Completed {
    match waiting {
        Some(Waiting::Step(completion)) => Completed::Step(completion.await),
        Some(Waiting::Clean {
            purpose,
            root_file,
            future,
        }) => Completed::Clean {
            purpose: *purpose,
            root_file: root_file.clone(),
            result: future.await,
        },
        None => std::future::pending().await,
    }
}

/// Handle for submitting build requests
#[derive(Debug, Clone)]
pub struct BuildHandle {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<BuildEvent>,
    phase: watch::Receiver<BuildPhase>,
    saving: Arc<AtomicBool>,
}

impl BuildHandle {
    /// Request a build of `root_file`
    ///
    /// Returns as soon as the request is queued.
    pub fn build(&self, root_file: impl Into<PathBuf>) -> Result<(), BuildError> {
        self.requests
            .send(Request::Build(root_file.into()))
            .map_err(|_| BuildError::OrchestratorStopped)
    }

    /// Request a build and wait until it succeeds or fails
    ///
    /// Preemption of this document's session by a newer request for the same
    /// document keeps waiting for that newer session.
    pub async fn build_and_wait(
        &self,
        root_file: impl Into<PathBuf>,
    ) -> Result<BuildEvent, BuildError> {
        let root_file = root_file.into();
        let mut events = self.subscribe();
        self.build(root_file.clone())?;

        loop {
            match events.recv().await {
                Ok(event @ (BuildEvent::Succeeded { .. } | BuildEvent::Failed { .. }))
                    if event.root_file() == root_file =>
                {
                    return Ok(event);
                }
                Ok(BuildEvent::Preempted { root_file: old, next })
                    if old == root_file && next != root_file =>
                {
                    return Ok(BuildEvent::Preempted {
                        root_file: old,
                        next,
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} build events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BuildError::OrchestratorStopped);
                }
            }
        }
    }

    /// Subscribe to build events
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    /// Current phase
    pub fn phase(&self) -> BuildPhase {
        *self.phase.borrow()
    }

    /// Whether documents are being saved by the orchestrator itself
    ///
    /// Save-triggered builds should ignore saves while this is set.
    pub fn saves_suppressed(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Stop the orchestrator, killing any running step
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}

/// The build state machine
pub struct BuildOrchestrator {
    settings: Arc<dyn SettingsSource>,
    collaborators: Collaborators,
    supervisor: ProcessSupervisor,
    session: Option<BuildSession>,
    pending_rebuild: Option<PathBuf>,
    waiting: Option<Waiting>,
    requests: mpsc::UnboundedReceiver<Request>,
    events: broadcast::Sender<BuildEvent>,
    phase: watch::Sender<BuildPhase>,
    saving: Arc<AtomicBool>,
}

impl BuildOrchestrator {
    /// Start the orchestrator task
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(settings: Arc<dyn SettingsSource>, collaborators: Collaborators) -> BuildHandle {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (phase, phase_rx) = watch::channel(BuildPhase::Idle);
        let saving = Arc::new(AtomicBool::new(false));

        let orchestrator = Self {
            settings,
            collaborators,
            supervisor: ProcessSupervisor::new(),
            session: None,
            pending_rebuild: None,
            waiting: None,
            requests,
            events: events.clone(),
            phase,
            saving: saving.clone(),
        };
        tokio::spawn(orchestrator.run());

        BuildHandle {
            requests: requests_tx,
            events,
            phase: phase_rx,
            saving,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Build(root_file)) => self.request_build(root_file).await,
                    Some(Request::Shutdown) | None => break,
                },
                completed = wait_for(&mut self.waiting), if self.waiting.is_some() => {
                    self.waiting = None;
                    match completed {
                        Completed::Step(outcome) => self.on_step_complete(outcome).await,
                        Completed::Clean { purpose, root_file, result } => {
                            self.on_clean_complete(purpose, &root_file, result).await;
                        }
                    }
                }
            }
        }

        if self.supervisor.kill() {
            tracing::info!("Killed running step on shutdown");
        }
        tracing::debug!("build orchestrator stopped");
    }

    fn emit(&self, event: BuildEvent) {
        tracing::debug!(?event, "build event");
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: BuildPhase) {
        self.phase.send_replace(phase);
    }

    /// Entry point of every build request
    async fn request_build(&mut self, root_file: PathBuf) {
        self.set_phase(BuildPhase::Preprocessing);
        self.saving.store(true, Ordering::SeqCst);
        self.collaborators.documents.save_all().await;
        self.saving.store(false, Ordering::SeqCst);

        if self.waiting.is_some() {
            if self.supervisor.kill() {
                self.collaborators
                    .logger
                    .log("Killed the previous build process to start a newer build.");
            }
            tracing::info!("Build of {} queued behind running build", root_file.display());
            self.pending_rebuild = Some(root_file);
            self.restore_phase();
            return;
        }

        self.pending_rebuild = None;
        self.start_session(root_file);
    }

    fn restore_phase(&self) {
        let phase = match (&self.waiting, &self.session) {
            (Some(Waiting::Step(_)), Some(session)) => BuildPhase::RunningStep(session.step),
            (Some(Waiting::Clean { purpose: CleanPurpose::Retry, .. }), _) => {
                BuildPhase::CleanAndRetry
            }
            (Some(Waiting::Clean { .. }), _) => BuildPhase::Cleaning,
            _ => BuildPhase::Idle,
        };
        self.set_phase(phase);
    }

    fn start_session(&mut self, root_file: PathBuf) {
        tracing::info!("Building {}", root_file.display());
        self.emit(BuildEvent::SessionStarted {
            root_file: root_file.clone(),
        });

        let settings = match self.settings.snapshot(&root_file) {
            Ok(settings) => settings,
            Err(e) => {
                self.abort(&root_file, FailureReason::Settings(e.to_string()));
                return;
            }
        };

        let toolchain = match resolve_toolchain(&root_file, &settings.toolchain) {
            Ok(toolchain) => toolchain,
            Err(e) => {
                self.abort(&root_file, FailureReason::InvalidToolchain(e.to_string()));
                return;
            }
        };

        if !magic::is_default_program(&toolchain.program) {
            self.collaborators.logger.log(&format!(
                "Found TeX program by magic comment: {}",
                toolchain.program
            ));
        }

        self.session = Some(BuildSession {
            root_file,
            settings,
            toolchain,
            step: 0,
            disable_clean_and_retry: false,
        });
        self.run_step(0);
    }

    /// End a request that never got to run a step
    fn abort(&mut self, root_file: &Path, reason: FailureReason) {
        tracing::error!("Cannot build {}: {reason}", root_file.display());
        self.collaborators.logger.log(&reason.to_string());
        self.collaborators
            .logger
            .display_status(&StatusUpdate::failed(format!("Build aborted: {reason}")));
        self.end_session();
        self.emit(BuildEvent::Failed {
            root_file: root_file.to_path_buf(),
            reason,
        });
    }

    fn end_session(&mut self) {
        self.session = None;
        self.restore_phase();
    }

    fn run_step(&mut self, index: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.step = index;

        let Some(step) = session.toolchain.get(index).cloned() else {
            self.succeed();
            return;
        };
        let root_file = session.root_file.clone();
        let spec = ProcessSpec {
            command: step.command.clone(),
            args: step.args.clone(),
            working_dir: session.working_dir(),
        };

        let logger = &self.collaborators.logger;
        logger.clear_diagnostics();
        logger.log(&format!("Recipe step {}: {step}", index + 1));
        logger.display_status(&StatusUpdate::running());
        tracing::info!("Step {}: {step}", index + 1);

        self.set_phase(BuildPhase::RunningStep(index));
        self.emit(BuildEvent::StepStarted {
            root_file: root_file.clone(),
            index,
            step,
        });

        let sink = Arc::new(LoggerSink(self.collaborators.logger.clone()));
        match self.supervisor.run(&spec, sink) {
            Ok(completion) => self.waiting = Some(Waiting::Step(completion)),
            Err(e) => self.fail(&root_file, FailureReason::Fatal(e.to_string())),
        }
    }

    async fn on_step_complete(&mut self, outcome: ProcessOutcome) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let root_file = session.root_file.clone();
        let index = session.step;

        if let Some(stdout) = outcome.stdout() {
            self.collaborators.parser.parse(stdout);
        }

        if let Some(next) = self.pending_rebuild.take() {
            self.supersede(root_file, next).await;
            return;
        }

        match outcome {
            ProcessOutcome::Success { .. } => self.run_step(index + 1),
            ProcessOutcome::Fatal { message, stderr } => {
                let logger = &self.collaborators.logger;
                logger.log(&format!("Recipe terminated with fatal error: {message}."));
                if !stderr.is_empty() {
                    logger.log(&stderr);
                }
                self.fail(&root_file, FailureReason::Fatal(message));
            }
            ProcessOutcome::Failure {
                code,
                signal,
                stderr,
                ..
            } => {
                tracing::warn!(?code, ?signal, "Step {} of {} failed", index + 1, root_file.display());
                let logger = &self.collaborators.logger;
                logger.log(&format!(
                    "Recipe returns with error: {}/{}.",
                    code.map_or_else(|| "undefined".to_string(), |c| c.to_string()),
                    signal.map_or_else(|| "none".to_string(), |s| s.to_string()),
                ));
                if !stderr.is_empty() {
                    logger.log(&stderr);
                }

                let retry = !session.disable_clean_and_retry
                    && session.settings.allows_clean_and_retry();
                if retry {
                    session.disable_clean_and_retry = true;
                    let settings = session.settings.clone();
                    let message = "Cleaning auxiliary files and retrying build after toolchain error.";
                    logger.log(message);
                    logger.display_status(&StatusUpdate::retrying(message));
                    self.emit(BuildEvent::Retrying {
                        root_file: root_file.clone(),
                    });
                    self.start_clean(CleanPurpose::Retry, root_file, settings);
                } else {
                    self.fail(&root_file, FailureReason::StepFailed { index, code });
                }
            }
        }
    }

    /// Drop the current session in favour of a newer request
    async fn supersede(&mut self, root_file: PathBuf, next: PathBuf) {
        tracing::info!(
            "Build of {} superseded by {}",
            root_file.display(),
            next.display()
        );
        self.session = None;
        self.emit(BuildEvent::Preempted {
            root_file,
            next: next.clone(),
        });
        self.request_build(next).await;
    }

    fn fail(&mut self, root_file: &Path, reason: FailureReason) {
        self.collaborators
            .logger
            .display_status(&StatusUpdate::failed(reason.to_string()));
        self.end_session();
        self.emit(BuildEvent::Failed {
            root_file: root_file.to_path_buf(),
            reason,
        });
    }

    fn succeed(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let logger = &self.collaborators.logger;
        logger.log(&format!(
            "Recipe of length {} finished.",
            session.toolchain.len()
        ));
        logger.display_status(&StatusUpdate::succeeded("Recipe succeeded."));
        tracing::info!("Built {}", session.root_file.display());

        self.collaborators
            .viewer
            .refresh(&session.root_file, &session.settings);
        if session.settings.clean_enabled {
            self.start_clean(
                CleanPurpose::AfterSuccess,
                session.root_file.clone(),
                session.settings,
            );
        } else {
            self.restore_phase();
        }
        self.emit(BuildEvent::Succeeded {
            root_file: session.root_file,
        });
    }

    fn start_clean(&mut self, purpose: CleanPurpose, root_file: PathBuf, settings: BuildSettings) {
        let cleaner = self.collaborators.cleaner.clone();
        let target = root_file.clone();
        let future: BoxFuture<'static, io::Result<()>> =
            Box::pin(async move { cleaner.clean(&target, &settings).await });
        self.waiting = Some(Waiting::Clean {
            purpose,
            root_file,
            future,
        });
        self.restore_phase();
    }

    async fn on_clean_complete(
        &mut self,
        purpose: CleanPurpose,
        root_file: &Path,
        result: io::Result<()>,
    ) {
        if let Err(e) = result {
            tracing::warn!("Cleaning {} failed: {e}", root_file.display());
            self.collaborators
                .logger
                .log(&format!("Failed to clean auxiliary files: {e}"));
        }
        self.emit(BuildEvent::Cleaned {
            root_file: root_file.to_path_buf(),
        });

        if let Some(next) = self.pending_rebuild.take() {
            if self.session.is_some() {
                self.supersede(root_file.to_path_buf(), next).await;
            } else {
                self.request_build(next).await;
            }
            return;
        }

        match purpose {
            CleanPurpose::Retry => self.run_step(0),
            CleanPurpose::AfterSuccess => self.restore_phase(),
        }
    }
}
