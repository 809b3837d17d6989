//! OperationService: transport-agnostic request handling.
//!
//! One request runs through: registry lookup → payload build → worker
//! execution → success unwrapping. Every failure along the way ends up as a
//! [`ResultEnvelope`]; nothing escapes as a Rust error. Transports (HTTP)
//! only translate their own input into a [`Request`] and serialize the
//! envelope back.

use std::sync::Arc;

use serde::Serialize;

use crate::bridge::{Executor, ProcessBridge};
use crate::config::ServiceConfig;
use crate::envelope::{ErrorDetails, ErrorKind, ResultEnvelope, unwrap_worker_envelope};
use crate::payload::{self, Request};
use crate::registry::{OperationRegistry, OutputFormat};
use crate::version::VersionInfo;

/// Availability of one registered operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub id: &'static str,
    pub worker: String,
    pub available: bool,
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub version: VersionInfo,
    pub operations: Vec<OperationStatus>,
}

impl HealthSnapshot {
    pub fn all_available(&self) -> bool {
        self.operations.iter().all(|op| op.available)
    }
}

#[derive(Clone)]
pub struct OperationService {
    registry: Arc<OperationRegistry>,
    executor: Arc<dyn Executor>,
}

impl OperationService {
    /// Standard registry and a process bridge, both derived from `config`.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            registry: Arc::new(OperationRegistry::from_config(config)),
            executor: Arc::new(ProcessBridge::new(config.worker_timeout)),
        }
    }

    pub fn with_executor(registry: OperationRegistry, executor: Arc<dyn Executor>) -> Self {
        Self {
            registry: Arc::new(registry),
            executor,
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn health(&self) -> HealthSnapshot {
        let operations = self
            .registry
            .operations()
            .map(|op| OperationStatus {
                id: op.id,
                worker: op.worker.name(),
                available: op.worker.exists(),
            })
            .collect();
        let interpreter = self
            .registry
            .operations()
            .find_map(|op| op.worker.interpreter.clone());
        HealthSnapshot {
            version: VersionInfo::new().with_interpreter(interpreter),
            operations,
        }
    }

    /// Run one request end to end.
    pub async fn handle(&self, request: Request) -> ResultEnvelope {
        let Request {
            operation,
            input,
            options,
        } = request;

        let descriptor = match self.registry.resolve(&operation) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected request");
                return ErrorDetails::from(e).into();
            }
        };

        let payload = match payload::build(descriptor, input, options.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(operation = descriptor.id, error = %e, "Rejected request");
                return ErrorDetails::from(e).into();
            }
        };

        let worker_input = match payload.encode() {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(operation = descriptor.id, error = %e, "Failed to encode payload");
                return ResultEnvelope::error(
                    ErrorKind::SystemError,
                    "Failed to encode worker payload",
                    e.to_string(),
                );
            }
        };

        tracing::info!(operation = descriptor.id, "Running worker");
        let envelope = self.executor.execute(&descriptor.worker, worker_input).await;

        let envelope = match (descriptor.output, envelope) {
            (OutputFormat::WorkerEnvelope, ResultEnvelope::Success { data }) => {
                unwrap_worker_envelope(&data)
            }
            (_, envelope) => envelope,
        };
        match envelope.error_kind() {
            None => tracing::info!(operation = descriptor.id, "Operation succeeded"),
            Some(kind) => tracing::info!(operation = descriptor.id, %kind, "Operation failed"),
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::WorkerInput;
    use crate::payload::RawInput;
    use crate::registry::WorkerRef;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records every invocation and answers with a fixed envelope.
    struct RecordingExecutor {
        calls: Mutex<Vec<(WorkerRef, WorkerInput)>>,
        reply: ResultEnvelope,
    }

    impl RecordingExecutor {
        fn replying(reply: ResultEnvelope) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<(WorkerRef, WorkerInput)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, worker: &WorkerRef, input: WorkerInput) -> ResultEnvelope {
            self.calls.lock().unwrap().push((worker.clone(), input));
            self.reply.clone()
        }
    }

    fn service(executor: Arc<RecordingExecutor>) -> OperationService {
        let registry = OperationRegistry::with_worker_dir(Path::new("/srv/workers"), Some("python3"));
        OperationService::with_executor(registry, executor)
    }

    fn csv(bytes: &str) -> RawInput {
        RawInput::file("data.csv", bytes.as_bytes())
    }

    #[tokio::test]
    async fn unknown_operation_never_spawns() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success("unused"));
        let envelope = service(executor.clone())
            .handle(Request::new("explode", csv("a\n1\n")))
            .await;

        assert_eq!(envelope.error_kind(), Some(&ErrorKind::InvalidOperation));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_spawns() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success("unused"));
        let service = service(executor.clone());

        let wrong_ext = service
            .handle(Request::new("info", RawInput::file("data.xlsx", "x")))
            .await;
        assert_eq!(wrong_ext.error_kind(), Some(&ErrorKind::InvalidFile));

        let no_options = service.handle(Request::new("clean", csv("a\n1\n"))).await;
        assert_eq!(no_options.error_kind(), Some(&ErrorKind::InvalidOperation));

        let bad_json = service
            .handle(Request::new("vis_data", csv("a\n1\n")).with_options("{not json"))
            .await;
        assert_eq!(bad_json.error_kind(), Some(&ErrorKind::InvalidJsonOrOptions));

        let blank_url = service
            .handle(Request::new("html_data", RawInput::url("   ")))
            .await;
        assert_eq!(blank_url.error_kind(), Some(&ErrorKind::InvalidFile));

        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn tabular_success_is_unwrapped() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success(
            r#"{"Status": "success", "Data": "RangeIndex: 2 entries"}"#,
        ));
        let envelope = service(executor.clone())
            .handle(Request::new("info", csv("a\n1\n2\n")))
            .await;

        assert_eq!(envelope, ResultEnvelope::success("RangeIndex: 2 entries"));

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0.program,
            Path::new("/srv/workers/info_script.py")
        );
        let sent: serde_json::Value = serde_json::from_slice(&calls[0].1.stdin).unwrap();
        assert_eq!(sent, serde_json::json!({"csv_data": "a\n1\n2\n"}));
    }

    #[tokio::test]
    async fn tabular_success_without_envelope_is_parse_error() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success("not json at all"));
        let envelope = service(executor)
            .handle(Request::new("info", csv("a\n1\n")))
            .await;
        assert_eq!(envelope.error_kind(), Some(&ErrorKind::ParseError));
    }

    #[tokio::test]
    async fn document_success_is_opaque() {
        let stdout = "[{\"table_index\": 0, \"data\": []}]\n";
        let executor = RecordingExecutor::replying(ResultEnvelope::success(stdout));
        let envelope = service(executor.clone())
            .handle(Request::new(
                "extract_tables",
                RawInput::file("Report.PDF", b"%PDF-1.4".to_vec()),
            ))
            .await;

        assert_eq!(envelope, ResultEnvelope::success(stdout));

        let calls = executor.calls();
        assert_eq!(calls[0].1.args, vec![".pdf".to_string()]);
        assert_eq!(calls[0].1.stdin, b"JVBERi0xLjQ=\n".to_vec());
    }

    #[tokio::test]
    async fn web_page_sends_url_line() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success("<html/>"));
        let envelope = service(executor.clone())
            .handle(Request::new("html_data", RawInput::url("https://example.com")))
            .await;

        assert_eq!(envelope.data(), Some("<html/>"));
        assert_eq!(executor.calls()[0].1.stdin, b"https://example.com\n".to_vec());
    }

    #[tokio::test]
    async fn worker_errors_pass_through_unchanged() {
        let reply = ResultEnvelope::error(
            ErrorKind::Worker("INVALID_COLUMN".to_string()),
            "Column not found",
            "Column: price",
        );
        let executor = RecordingExecutor::replying(reply.clone());
        let envelope = service(executor)
            .handle(
                Request::new("clean", csv("a\n1\n"))
                    .with_options(
                        r#"{"method": "drop_nulls", "column": "price", "value": null, "target_type": null, "limit": null}"#,
                    ),
            )
            .await;

        assert_eq!(envelope, reply);
    }

    #[tokio::test]
    async fn identical_requests_send_identical_input() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success(
            r#"{"Status": "success", "Data": "x,y\n1,2\n"}"#,
        ));
        let service = service(executor.clone());
        let request = || {
            Request::new("vis_data", csv("x,y\n1,2\n"))
                .with_options(
                    r#"{"method": "scatter", "target_column": null, "selected_cols": ["x", "y"]}"#,
                )
        };

        let first = service.handle(request()).await;
        let second = service.handle(request()).await;

        assert_eq!(first, second);
        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn health_reports_missing_workers() {
        let executor = RecordingExecutor::replying(ResultEnvelope::success(""));
        let snapshot = service(executor).health();

        assert_eq!(snapshot.operations.len(), 5);
        assert!(!snapshot.all_available());
        assert_eq!(snapshot.operations[0].id, "info");
        assert_eq!(snapshot.operations[0].worker, "info_script.py");
    }
}
