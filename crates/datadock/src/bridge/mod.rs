//! Process execution bridge.
//!
//! One worker process per request, talking over stdin/stdout/stderr only:
//!
//! - **process**: spawn, feed stdin, drain stdout/stderr concurrently, wait,
//!   release (kill + reap on every non-success path), bounded by a timeout
//! - **classify**: exit status + captured streams → [`ResultEnvelope`]

pub mod classify;
pub mod process;

use async_trait::async_trait;

use crate::envelope::ResultEnvelope;
use crate::registry::WorkerRef;

pub use classify::{ProcessOutcome, classify};
pub use process::{ExchangeError, ProcessBridge};

/// What a worker receives: extra argv entries and the bytes written to stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerInput {
    pub args: Vec<String>,
    pub stdin: Vec<u8>,
}

impl WorkerInput {
    pub fn stdin(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            args: Vec::new(),
            stdin: bytes.into(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Runs a worker to completion and reports the outcome as an envelope.
///
/// Implementations never fail outside the envelope: every error, local or
/// worker-reported, comes back as `ResultEnvelope::Error`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, worker: &WorkerRef, input: WorkerInput) -> ResultEnvelope;
}
