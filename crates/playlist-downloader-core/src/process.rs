//! Line-streaming runner for external processes.
//!
//! The downloader reports progress as plain text on stdout. [`run_streaming`]
//! forwards each line to a sink as it arrives and ends every run with a single
//! [`OutputEvent::Finished`], whether the process exited on its own, timed out
//! or was cancelled. Stderr is kept for diagnostics but never reaches the sink.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::{DownloaderError, Error, Result};

/// Number of stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for stderr to drain after the process is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    /// Exited with status zero.
    Success,
    /// Exited with a non-zero status, or was killed by a signal (`code` is `None`).
    Failed {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },
    /// Killed after exceeding the timeout.
    TimedOut,
    /// Killed on request.
    Cancelled,
}

/// Summary of a finished process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// How the run ended.
    pub state: ExitState,
    /// Number of non-blank stdout lines delivered to the sink.
    pub lines: usize,
    /// Last lines written to stderr.
    pub stderr_tail: Vec<String>,
}

impl ProcessExit {
    /// Whether the process exited successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        self.state == ExitState::Success
    }
}

/// Event delivered to an output sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// One trimmed stdout line.
    Line(String),
    /// Terminal event: the stream is closed and the process is gone.
    Finished(ProcessExit),
}

/// Caller-supplied receiver of process output.
pub type OutputSink = Arc<dyn Fn(OutputEvent) + Send + Sync>;

/// Shared switch that stops running processes.
///
/// Cloning yields another handle to the same switch. A cancelled handle stays
/// cancelled, and every run started with it stops immediately, until
/// [`CancelHandle::reset`] is called.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Create a handle in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Run `command`, streaming its stdout to `sink` line by line.
///
/// Returns once stdout has closed and the process has exited, or after it has
/// been killed because `timeout` elapsed or `cancel` fired. A non-zero exit is
/// reported in the returned [`ProcessExit`]; only failing to start or to read
/// from the process is an error.
pub async fn run_streaming(
    mut command: Command,
    sink: &OutputSink,
    cancel: &CancelHandle,
    timeout: Option<Duration>,
) -> Result<ProcessExit> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let args: Vec<String> = command
        .as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    if cancel.is_cancelled() {
        debug!("Not starting {}: cancelled", program);
        let exit = ProcessExit {
            state: ExitState::Cancelled,
            lines: 0,
            stderr_tail: Vec::new(),
        };
        sink(OutputEvent::Finished(exit.clone()));
        return Ok(exit);
    }

    info!("Running {} {}", program, args.join(" "));

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| spawn_error(&program, &e))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| stream_error(&program, "stdout was not captured"))?;
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES)));

    let mut cancel_rx = cancel.subscribe();
    let deadline = async move {
        match timeout {
            Some(limit) => sleep_until(Instant::now() + limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut lines = 0;

    let interrupted = loop {
        buf.clear();
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => break None,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim();
                    if !line.is_empty() {
                        lines += 1;
                        sink(OutputEvent::Line(line.to_string()));
                    }
                }
                Err(e) => return Err(stream_error(&program, &e.to_string())),
            },
            () = &mut deadline => break Some(ExitState::TimedOut),
            () = cancelled(&mut cancel_rx) => break Some(ExitState::Cancelled),
        }
    };

    let state = match interrupted {
        Some(state) => {
            kill(&mut child, &program, &state).await;
            state
        }
        None => {
            // Stdout is closed; the process may still be finishing up.
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|e| stream_error(&program, &e.to_string()))?;
                    if status.success() {
                        ExitState::Success
                    } else {
                        ExitState::Failed { code: status.code() }
                    }
                }
                () = &mut deadline => {
                    kill(&mut child, &program, &ExitState::TimedOut).await;
                    ExitState::TimedOut
                }
                () = cancelled(&mut cancel_rx) => {
                    kill(&mut child, &program, &ExitState::Cancelled).await;
                    ExitState::Cancelled
                }
            }
        }
    };

    let stderr_tail = match stderr_task {
        Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
            Ok(Ok(tail)) => tail,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    match &state {
        ExitState::Success => info!("{} finished ({} lines)", program, lines),
        ExitState::Failed { code } => warn!(
            "{} failed with exit code {:?}; stderr: {}",
            program,
            code,
            stderr_tail.join(" | ")
        ),
        ExitState::TimedOut | ExitState::Cancelled => {}
    }

    let exit = ProcessExit {
        state,
        lines,
        stderr_tail,
    };
    sink(OutputEvent::Finished(exit.clone()));
    Ok(exit)
}

/// Resolve once cancellation is requested.
///
/// The borrow of the channel value ends here so the future stays `Send`.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender gone: cancellation can no longer be requested.
        std::future::pending::<()>().await;
    }
}

async fn kill(child: &mut tokio::process::Child, program: &str, reason: &ExitState) {
    warn!("Stopping {} ({:?})", program, reason);
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}: {}", program, e);
    }
}

/// Read a stream to the end, keeping the last `keep` non-blank lines.
async fn collect_tail<R>(stream: R, keep: usize) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut tail = VecDeque::with_capacity(keep);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                debug!(target: "playlist_downloader_core::process::stderr", "{}", line);
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
            }
        }
    }

    tail.into()
}

fn spawn_error(program: &str, e: &std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::Downloader(DownloaderError::BinaryNotFound {
            program: program.to_string(),
        })
    } else {
        Error::Downloader(DownloaderError::SpawnFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })
    }
}

fn stream_error(program: &str, reason: &str) -> Error {
    Error::Downloader(DownloaderError::StreamFailed {
        program: program.to_string(),
        reason: reason.to_string(),
    })
}
