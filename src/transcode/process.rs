//! Transcoder process supervision.
//!
//! [`Transcoder::invoke`] spawns the transcoder and resolves as soon as the
//! first output byte exists, so callers can still answer with a clean error
//! status when the process fails early. After that point the response is
//! committed and failures travel through the async error callback and the
//! output stream itself.
//!
//! One supervisor task per process owns the child and both pipes:
//!
//! ```text
//!  stdout ──► OutputStream (bounded) ──► caller
//!  stderr ──► DiagnosticParser ──► progress watch
//!  wait() ──► Outcome watch ──► Canceller / tee
//! ```

use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TranscodeError;

use super::args::CompiledInvocation;
use super::progress::{DiagnosticParser, Progress};

/// Read size for the output pipe.
const CHUNK_SIZE: usize = 64 * 1024;

/// Output chunks buffered between the process and the consumer.
const OUTPUT_BUFFER: usize = 16;

/// Time a cancelled transcoder gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Invoked at most once, for failures that happen after the first output byte.
pub type AsyncErrorCallback = Box<dyn FnOnce(TranscodeError) + Send + 'static>;

/// Final state of a transcoder run.
#[derive(Debug, Clone)]
pub enum Outcome {
    Running,
    /// Exited successfully after producing output
    Completed,
    /// Stopped through a [`Canceller`] or because the consumer went away
    Cancelled,
    Failed(TranscodeError),
}

impl Outcome {
    pub fn is_running(&self) -> bool {
        matches!(self, Outcome::Running)
    }
}

/// Spawns transcoder processes.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
    base_args: Vec<String>,
}

impl Transcoder {
    /// Transcoder running `program` with the compiled arguments only.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    /// Transcoder that puts `base_args` in front of every compiled argument list.
    pub fn with_base_args<I, S>(program: impl Into<String>, base_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            base_args: base_args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start a transcode and wait for its first output byte.
    ///
    /// Fails with the classified error if the process ends before writing
    /// anything. Dropping the returned future kills the process.
    pub async fn invoke(
        &self,
        invocation: &CompiledInvocation,
        on_async_error: AsyncErrorCallback,
    ) -> Result<TranscodeHandle, TranscodeError> {
        debug!(program = %self.program, args = ?invocation.args, "Spawning transcoder");

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::Spawn(format!("{}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscodeError::Spawn("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodeError::Spawn("stderr was not captured".to_string()))?;

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(OUTPUT_BUFFER);
        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        let (outcome_tx, outcome_rx) = watch::channel(Outcome::Running);

        let supervisor = Supervisor {
            child,
            cancel: cancel.clone(),
            ready: Some(ready_tx),
            body: body_tx,
            progress: progress_tx,
            outcome: outcome_tx,
            on_async_error: Some(on_async_error),
            parser: DiagnosticParser::new(),
            started: Instant::now(),
        };
        tokio::spawn(supervisor.run(stdout, stderr));

        let guard = cancel.clone().drop_guard();
        ready_rx.await.unwrap_or_else(|_| {
            Err(TranscodeError::Io(
                "transcoder supervisor stopped unexpectedly".to_string(),
            ))
        })?;
        guard.disarm();

        Ok(TranscodeHandle {
            stream: OutputStream { rx: body_rx },
            canceller: Canceller {
                token: cancel,
                outcome: outcome_rx.clone(),
            },
            progress: progress_rx,
            outcome: outcome_rx,
        })
    }
}

/// A transcode that has produced its first byte.
pub struct TranscodeHandle {
    /// Artifact bytes, first chunk included
    pub stream: OutputStream,
    pub canceller: Canceller,
    pub progress: watch::Receiver<Progress>,
    pub outcome: watch::Receiver<Outcome>,
}

/// Stops a running transcode.
#[derive(Debug, Clone)]
pub struct Canceller {
    token: CancellationToken,
    outcome: watch::Receiver<Outcome>,
}

impl Canceller {
    /// Terminate the process and wait until it has exited.
    ///
    /// Idempotent, and a no-op once the process has already ended.
    pub async fn cancel(&self) {
        self.token.cancel();
        let mut outcome = self.outcome.clone();
        let _ = outcome.wait_for(|o| !o.is_running()).await;
    }
}

/// Artifact byte stream.
///
/// Ends with an `Err` item if the transcode fails after the first byte.
/// Dropping the stream cancels the transcode.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl Stream for OutputStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct Supervisor {
    child: Child,
    cancel: CancellationToken,
    ready: Option<oneshot::Sender<Result<(), TranscodeError>>>,
    body: mpsc::Sender<io::Result<Bytes>>,
    progress: watch::Sender<Progress>,
    outcome: watch::Sender<Outcome>,
    on_async_error: Option<AsyncErrorCallback>,
    parser: DiagnosticParser,
    started: Instant,
}

impl Supervisor {
    async fn run<O, E>(mut self, mut stdout: O, mut stderr: E)
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut out_buf = BytesMut::with_capacity(CHUNK_SIZE);
        let mut err_buf = vec![0u8; 8 * 1024];
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut status: Option<io::Result<ExitStatus>> = None;
        let mut cancelled = false;
        let mut produced = false;
        let mut read_error: Option<io::Error> = None;

        let kill_timer = tokio::time::sleep(TERMINATE_GRACE);
        tokio::pin!(kill_timer);
        let mut kill_armed = false;

        while status.is_none() || (!cancelled && (stdout_open || stderr_open)) {
            out_buf.reserve(CHUNK_SIZE);

            tokio::select! {
                _ = self.cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    if status.is_none() {
                        self.terminate();
                        kill_timer.as_mut().reset(tokio::time::Instant::now() + TERMINATE_GRACE);
                        kill_armed = true;
                    }
                }
                _ = &mut kill_timer, if kill_armed && status.is_none() => {
                    kill_armed = false;
                    warn!("Transcoder ignored SIGTERM, killing it");
                    if let Err(e) = self.child.start_kill() {
                        warn!(error = %e, "Failed to kill transcoder");
                    }
                }
                read = stdout.read_buf(&mut out_buf), if stdout_open && !cancelled => match read {
                    Ok(0) => stdout_open = false,
                    Ok(_) => {
                        produced = true;
                        self.commit();
                        let chunk = out_buf.split().freeze();
                        tokio::select! {
                            sent = self.body.send(Ok(chunk)) => {
                                if sent.is_err() {
                                    self.cancel.cancel();
                                }
                            }
                            _ = self.cancel.cancelled() => {}
                        }
                    }
                    Err(e) => {
                        stdout_open = false;
                        read_error = Some(e);
                        self.cancel.cancel();
                    }
                },
                read = stderr.read(&mut err_buf), if stderr_open => match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => {
                        if self.parser.feed(&err_buf[..n]) {
                            self.publish_progress();
                        }
                    }
                },
                result = self.child.wait(), if status.is_none() => {
                    status = Some(result);
                }
                _ = self.body.closed(), if !self.cancel.is_cancelled() => {
                    debug!("Transcoder output dropped by consumer");
                    self.cancel.cancel();
                }
            }
        }

        if self.parser.finish() {
            self.publish_progress();
        }

        let outcome = match status {
            Some(status) => self.classify(status, cancelled, produced, read_error),
            None => Outcome::Failed(TranscodeError::Io("transcoder was not awaited".to_string())),
        };
        self.finish(outcome).await;
    }

    fn classify(
        &self,
        status: io::Result<ExitStatus>,
        cancelled: bool,
        produced: bool,
        read_error: Option<io::Error>,
    ) -> Outcome {
        let status = match status {
            Ok(status) => status,
            Err(e) => return Outcome::Failed(TranscodeError::Io(e.to_string())),
        };

        // A read error cancels the run, but it is still a failure.
        if let Some(e) = read_error {
            return Outcome::Failed(TranscodeError::Io(e.to_string()));
        }
        if cancelled {
            return Outcome::Cancelled;
        }
        if status.success() {
            return if produced {
                Outcome::Completed
            } else {
                Outcome::Failed(TranscodeError::EmptyOutput)
            };
        }
        if self.parser.source_missing() {
            return Outcome::Failed(TranscodeError::SourceNotFound);
        }
        Outcome::Failed(TranscodeError::Failed {
            code: status.code(),
            diagnostics: self.parser.transcript().to_string(),
        })
    }

    fn publish_progress(&self) {
        let current = self.parser.progress();
        let previous = self.progress.send_replace(current);

        if current.threads.is_some() && previous.threads != current.threads {
            debug!(threads = ?current.threads, "Transcoder threads");
        }
        if let Some(ratio) = current.ratio() {
            let percent = (ratio * 100.0).floor() as u32;
            let before = previous.ratio().map(|r| (r * 100.0).floor() as u32);
            if before != Some(percent) {
                debug!(percent, "Transcoder progress");
            }
        }
    }

    /// Ask the process to stop, falling back to a kill where signals are unavailable.
    fn terminate(&mut self) {
        if send_sigterm(&self.child) {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to kill transcoder");
        }
    }

    /// Signal that the first byte exists.
    fn commit(&mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
    }

    async fn finish(mut self, outcome: Outcome) {
        match &outcome {
            Outcome::Completed => {
                let media_ms = self.parser.progress().position_ms.unwrap_or(0);
                let elapsed_ms = self.started.elapsed().as_millis() as u64;
                info!("Converted {} ms of media in {} ms", media_ms, elapsed_ms);
            }
            Outcome::Cancelled => debug!("Transcoder cancelled"),
            Outcome::Failed(TranscodeError::Failed { code, diagnostics }) => warn!(
                code = ?code,
                diagnostics = %diagnostics,
                "Transcoder failed"
            ),
            Outcome::Failed(e) => warn!(error = %e, "Transcoder failed"),
            Outcome::Running => {}
        }

        let error = match &outcome {
            Outcome::Failed(e) => Some(e.clone()),
            Outcome::Cancelled if self.ready.is_some() => Some(TranscodeError::Io(
                "transcoder was cancelled before producing output".to_string(),
            )),
            _ => None,
        };

        if let Some(error) = error {
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(Err(error));
            } else {
                if let Some(callback) = self.on_async_error.take() {
                    callback(error.clone());
                }
                send_trailer(&self.body, &self.cancel, &error).await;
            }
        }

        self.outcome.send_replace(outcome);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    // SAFETY: kill(2) has no memory effects; `pid` is our own, not yet reaped child.
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

/// Append the public error message to a committed stream, then fail it.
async fn send_trailer(
    body: &mpsc::Sender<io::Result<Bytes>>,
    cancel: &CancellationToken,
    error: &TranscodeError,
) {
    let items = [
        Ok(Bytes::from_static(error.public_message().as_bytes())),
        Err(io::Error::other(error.to_string())),
    ];
    for item in items {
        tokio::select! {
            sent = body.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}
