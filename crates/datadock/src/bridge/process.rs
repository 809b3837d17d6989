//! Worker process lifecycle.
//!
//! Per invocation:
//! 1. Check the worker program exists (else `SYSTEM_ERROR`, nothing spawned)
//! 2. Spawn with all three standard streams piped
//! 3. Feed stdin and close it, while draining stdout and stderr concurrently
//! 4. Wait for exit
//! 5. Classify
//!
//! Steps 3-4 run under the configured timeout. On timeout or any I/O failure
//! the child is killed and reaped before the envelope is returned.

use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::Instrument;

use super::classify::{ProcessOutcome, classify};
use super::{Executor, WorkerInput};
use crate::config::DEFAULT_WORKER_TIMEOUT;
use crate::envelope::{ErrorKind, ResultEnvelope};
use crate::registry::WorkerRef;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("worker {0} pipe was not captured")]
    MissingPipe(&'static str),
    #[error("failed to write worker input: {0}")]
    Write(#[source] io::Error),
    #[error("failed to read worker stdout: {0}")]
    ReadStdout(#[source] io::Error),
    #[error("failed to read worker stderr: {0}")]
    ReadStderr(#[source] io::Error),
    #[error("failed to wait for worker: {0}")]
    Wait(#[source] io::Error),
}

impl ExchangeError {
    fn into_envelope(self) -> ResultEnvelope {
        match self {
            ExchangeError::MissingPipe(_) | ExchangeError::Wait(_) => ResultEnvelope::error(
                ErrorKind::ExecutionError,
                "Failed to execute worker",
                self.to_string(),
            ),
            ExchangeError::Write(_) | ExchangeError::ReadStdout(_) | ExchangeError::ReadStderr(_) => {
                ResultEnvelope::error(
                    ErrorKind::ProcessingError,
                    "Failed to exchange data with worker",
                    self.to_string(),
                )
            }
        }
    }
}

/// Spawns one worker process per call. Holds no per-invocation state, so a
/// single instance serves any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    timeout: Duration,
}

impl Default for ProcessBridge {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_TIMEOUT)
    }
}

impl ProcessBridge {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `worker` with `input` and classify the result.
    pub async fn run(&self, worker: &WorkerRef, input: WorkerInput) -> ResultEnvelope {
        let invocation_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("invocation", %invocation_id, worker = %worker.name());
        self.run_invocation(worker, input).instrument(span).await
    }

    async fn run_invocation(&self, worker: &WorkerRef, input: WorkerInput) -> ResultEnvelope {
        if !worker.exists() {
            tracing::error!(path = %worker.program.display(), "Worker program not found");
            return ResultEnvelope::error(
                ErrorKind::SystemError,
                "Worker program not found",
                format!("Worker path: {}", worker.program.display()),
            );
        }

        let mut child = match spawn(worker, &input.args) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn worker");
                return ResultEnvelope::error(
                    ErrorKind::ExecutionError,
                    "Failed to start worker",
                    e.to_string(),
                );
            }
        };
        tracing::debug!(pid = ?child.id(), stdin_bytes = input.stdin.len(), "Worker spawned");

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, exchange(&mut child, &input.stdin)).await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    exit_code = ?outcome.exit_code,
                    stdout_bytes = outcome.stdout.len(),
                    stderr_bytes = outcome.stderr.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Worker exited"
                );
                classify(outcome)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Worker exchange failed");
                release(&mut child).await;
                e.into_envelope()
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Worker timed out, killing");
                release(&mut child).await;
                ResultEnvelope::error(
                    ErrorKind::Timeout,
                    "Worker timed out",
                    format!("Worker exceeded {:?} and was terminated", self.timeout),
                )
            }
        }
    }
}

#[async_trait]
impl Executor for ProcessBridge {
    async fn execute(&self, worker: &WorkerRef, input: WorkerInput) -> ResultEnvelope {
        self.run(worker, input).await
    }
}

fn spawn(worker: &WorkerRef, args: &[String]) -> io::Result<Child> {
    let mut command = match &worker.interpreter {
        Some(interpreter) => {
            let mut command = Command::new(interpreter);
            command.arg(&worker.program);
            command
        }
        None => Command::new(&worker.program),
    };
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Feed stdin and drain both output streams concurrently, then wait for exit.
///
/// stdin is fully written and closed before the exit status is awaited.
async fn exchange(child: &mut Child, input: &[u8]) -> Result<ProcessOutcome, ExchangeError> {
    let stdin = child
        .stdin
        .take()
        .ok_or(ExchangeError::MissingPipe("stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or(ExchangeError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(ExchangeError::MissingPipe("stderr"))?;

    let (fed, stdout, stderr) = tokio::join!(feed(stdin, input), drain(stdout), drain(stderr));
    fed.map_err(ExchangeError::Write)?;
    let stdout = stdout.map_err(ExchangeError::ReadStdout)?;
    let stderr = stderr.map_err(ExchangeError::ReadStderr)?;

    let status = child.wait().await.map_err(ExchangeError::Wait)?;

    Ok(ProcessOutcome {
        exit_code: status.code(),
        stdout,
        stderr,
    })
}

/// Write the whole input, then close the pipe. The handle is dropped on every
/// path so the worker always sees end-of-input.
async fn feed(mut stdin: ChildStdin, input: &[u8]) -> io::Result<()> {
    let written = match stdin.write_all(input).await {
        Ok(()) => stdin.shutdown().await,
        Err(e) => Err(e),
    };
    drop(stdin);

    match written {
        // Worker stopped reading (usually: rejected its input and exited).
        // Its exit status and stderr decide the outcome.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("Worker closed stdin before consuming all input");
            Ok(())
        }
        other => other,
    }
}

async fn drain(mut reader: impl AsyncRead + Unpin) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Kill and reap a worker that will not be classified normally.
async fn release(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Worker already exited before kill");
    }
}
