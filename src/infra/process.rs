//! Child process supervision
//!
//! Runs one external command at a time, streams its output to a sink while
//! accumulating it, and reports how the process ended.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::config::defaults::{OUTPUT_CHUNK_SIZE, OUTPUT_DRAIN_TIMEOUT_MS};
use crate::error::ProcessError;

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Receives output chunks as they arrive
pub trait OutputSink: Send + Sync {
    /// Handle one chunk
    fn chunk(&self, stream: OutputStream, text: &str);
}

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable, looked up on PATH
    pub command: String,
    /// Arguments, passed without shell interpretation
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: PathBuf,
}

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exited with code 0
    Success {
        /// Accumulated standard output
        stdout: String,
        /// Accumulated standard error
        stderr: String,
    },

    /// Exited with a non-zero code or was terminated by a signal
    Failure {
        /// Accumulated standard output
        stdout: String,
        /// Accumulated standard error
        stderr: String,
        /// Exit code, absent when killed
        code: Option<i32>,
        /// Terminating signal, if any
        signal: Option<i32>,
    },

    /// Could not be launched or waited on
    Fatal {
        /// Error description
        message: String,
        /// Standard error captured before the failure
        stderr: String,
    },
}

impl ProcessOutcome {
    /// Captured stdout, absent for fatal outcomes
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ProcessOutcome::Success { stdout, .. } | ProcessOutcome::Failure { stdout, .. } => {
                Some(stdout)
            }
            ProcessOutcome::Fatal { .. } => None,
        }
    }

    /// Exit code, when the process exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessOutcome::Success { .. } => Some(0),
            ProcessOutcome::Failure { code, .. } => *code,
            ProcessOutcome::Fatal { .. } => None,
        }
    }

    /// Whether the process exited with code 0
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success { .. })
    }
}

/// Completion signal for one supervised process
#[derive(Debug)]
pub struct ProcessCompletion {
    rx: oneshot::Receiver<ProcessOutcome>,
}

impl Future for ProcessCompletion {
    type Output = ProcessOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| ProcessOutcome::Fatal {
                message: "process supervisor task ended unexpectedly".to_string(),
                stderr: String::new(),
            })
        })
    }
}

/// Owner of at most one running child process
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    /// Kill switch of the live process, taken once used
    kill_tx: Option<oneshot::Sender<()>>,
    /// Cleared by the supervising task just before the outcome is sent
    alive: Option<Arc<AtomicBool>>,
    /// Command line of the live process
    current: Option<String>,
}

impl ProcessSupervisor {
    /// Create an idle supervisor
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a process is still running
    ///
    /// Stays true after [`kill`](Self::kill) until the killed process has
    /// been reaped and its outcome is about to be delivered.
    pub fn is_running(&self) -> bool {
        self.alive
            .as_ref()
            .is_some_and(|alive| alive.load(Ordering::SeqCst))
    }

    /// Start a process
    ///
    /// Returns immediately; the outcome is delivered through the returned
    /// completion. A spawn failure completes at once with
    /// [`ProcessOutcome::Fatal`] and leaves the supervisor idle.
    ///
    /// Must be called within a tokio runtime.
    pub fn run(
        &mut self,
        spec: &ProcessSpec,
        sink: Arc<dyn OutputSink>,
    ) -> Result<ProcessCompletion, ProcessError> {
        if self.is_running() {
            return Err(ProcessError::AlreadyRunning {
                command: self.current.clone().unwrap_or_default(),
            });
        }
        self.kill_tx = None;
        self.alive = None;
        self.current = None;

        let (tx, rx) = oneshot::channel();
        let completion = ProcessCompletion { rx };

        tracing::debug!(
            command = %spec.command,
            args = ?spec.args,
            cwd = %spec.working_dir.display(),
            "spawning process"
        );

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a kill reaches every descendant.
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn '{}': {e}", spec.command);
                let _ = tx.send(ProcessOutcome::Fatal {
                    message: format!("Failed to spawn '{}': {e}", spec.command),
                    stderr: String::new(),
                });
                return Ok(completion);
            }
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));
        self.kill_tx = Some(kill_tx);
        self.alive = Some(alive.clone());
        self.current = Some(spec.command.clone());

        tokio::spawn(supervise(child, kill_rx, sink, alive, tx));

        Ok(completion)
    }

    /// Terminate the running process, if any
    ///
    /// Signals the whole process group. The process then completes through
    /// its normal exit path with a [`ProcessOutcome::Failure`]. Returns
    /// whether a process was signalled.
    pub fn kill(&mut self) -> bool {
        match self.kill_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

async fn supervise(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    sink: Arc<dyn OutputSink>,
    alive: Arc<AtomicBool>,
    tx: oneshot::Sender<ProcessOutcome>,
) {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let mut stdout = String::new();
    let mut stderr = String::new();

    let status = {
        let pumps = async {
            tokio::join!(
                pump(stdout_pipe, OutputStream::Stdout, &*sink, &mut stdout),
                pump(stderr_pipe, OutputStream::Stderr, &*sink, &mut stderr),
            );
        };
        let wait = async {
            tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    terminate(&mut child);
                    child.wait().await
                }
            }
        };
        tokio::pin!(pumps, wait);

        let mut drained = false;
        let status = loop {
            tokio::select! {
                () = &mut pumps, if !drained => drained = true,
                status = &mut wait => break status,
            }
        };

        if !drained {
            let grace = Duration::from_millis(OUTPUT_DRAIN_TIMEOUT_MS);
            if tokio::time::timeout(grace, &mut pumps).await.is_err() {
                tracing::debug!("output pipes still open after exit, stopped reading");
            }
        }
        status
    };

    let outcome = match status {
        Ok(status) => outcome_from_status(status, stdout, stderr),
        Err(e) => ProcessOutcome::Fatal {
            message: format!("Failed to wait for process: {e}"),
            stderr,
        },
    };

    alive.store(false, Ordering::SeqCst);
    let _ = tx.send(outcome);
}

/// Kill the child's process group, falling back to the child alone
fn terminate(child: &mut Child) {
    tracing::debug!("killing process");

    #[cfg(unix)]
    if let Some(pgid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => tracing::debug!("killpg failed: {e}"),
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed: {e}");
    }
}

fn outcome_from_status(status: ExitStatus, stdout: String, stderr: String) -> ProcessOutcome {
    let code = status.code();
    if code == Some(0) {
        return ProcessOutcome::Success { stdout, stderr };
    }

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    tracing::debug!(?code, ?signal, "process exited unsuccessfully");
    ProcessOutcome::Failure {
        stdout,
        stderr,
        code,
        signal,
    }
}

/// Read a pipe to the end, forwarding each decoded chunk into `collected`
///
/// Whatever was read stays in `collected` even if the read is abandoned.
async fn pump<R>(
    reader: Option<R>,
    stream: OutputStream,
    sink: &dyn OutputSink,
    collected: &mut String,
) where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut pending = Vec::new();
    let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let text = drain_utf8(&mut pending);
                if !text.is_empty() {
                    sink.chunk(stream, &text);
                    collected.push_str(&text);
                }
            }
            Err(e) => {
                tracing::debug!(?stream, "read error: {e}");
                break;
            }
        }
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        sink.chunk(stream, &text);
        collected.push_str(&text);
    }
}

/// Decode the complete UTF-8 prefix of `pending`
///
/// An incomplete trailing sequence stays in `pending` for the next read.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}
