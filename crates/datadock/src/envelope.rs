//! Result envelope and error taxonomy.
//!
//! Every request, whatever happens to it, ends as a [`ResultEnvelope`]. The
//! wire shape is the one the browser client already consumes:
//!
//! ```json
//! {"status": "success", "data": "..."}
//! {"status": "error", "error": {"type": "...", "message": "...", "details": "..."}}
//! ```
//!
//! Workers report their own failures on stderr using capitalized keys
//! (`{"Status": "error", "Error": {"Type": ...}}`); both casings are accepted
//! and normalized into [`ErrorDetails`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error kinds produced locally, plus whatever a worker reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    /// Missing top-level request field (no file, no operation, no URL).
    InvalidRequest,
    /// Input shape or extension does not match the operation.
    InvalidFile,
    /// Unknown operation, or required options absent.
    InvalidOperation,
    /// Options present but malformed.
    InvalidJsonOrOptions,
    /// Worker program missing on disk.
    SystemError,
    /// Worker output could not be parsed into the expected structure.
    ParseError,
    /// Spawning or awaiting the worker failed.
    ExecutionError,
    /// Exchanging data with the worker over its pipes failed.
    ProcessingError,
    /// Worker exceeded its time limit and was killed.
    Timeout,
    /// Kind reported by the worker itself, passed through unchanged.
    Worker(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::InvalidFile => "INVALID_FILE",
            ErrorKind::InvalidOperation => "INVALID_OPERATION",
            ErrorKind::InvalidJsonOrOptions => "INVALID_JSON_OR_OPTIONS",
            ErrorKind::SystemError => "SYSTEM_ERROR",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::ExecutionError => "EXECUTION_ERROR",
            ErrorKind::ProcessingError => "PROCESSING_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Worker(kind) => kind,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "INVALID_REQUEST" => ErrorKind::InvalidRequest,
            "INVALID_FILE" => ErrorKind::InvalidFile,
            "INVALID_OPERATION" => ErrorKind::InvalidOperation,
            "INVALID_JSON_OR_OPTIONS" => ErrorKind::InvalidJsonOrOptions,
            "SYSTEM_ERROR" => ErrorKind::SystemError,
            "PARSE_ERROR" => ErrorKind::ParseError,
            "EXECUTION_ERROR" => ErrorKind::ExecutionError,
            "PROCESSING_ERROR" => ErrorKind::ProcessingError,
            "TIMEOUT" => ErrorKind::Timeout,
            _ => ErrorKind::Worker(kind),
        }
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Worker(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure carried by an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    /// Free-form detail. Workers may leave this null.
    pub details: Option<String>,
}

impl ErrorDetails {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

/// Uniform result returned for every request.
///
/// Exactly one of `data` / `error` exists, selected by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultEnvelope {
    Success { data: String },
    Error { error: ErrorDetails },
}

impl ResultEnvelope {
    pub fn success(data: impl Into<String>) -> Self {
        ResultEnvelope::Success { data: data.into() }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>, details: impl Into<String>) -> Self {
        ResultEnvelope::Error {
            error: ErrorDetails::new(kind, message, details),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultEnvelope::Success { .. })
    }

    pub fn data(&self) -> Option<&str> {
        match self {
            ResultEnvelope::Success { data } => Some(data),
            ResultEnvelope::Error { .. } => None,
        }
    }

    pub fn error_details(&self) -> Option<&ErrorDetails> {
        match self {
            ResultEnvelope::Success { .. } => None,
            ResultEnvelope::Error { error } => Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<&ErrorKind> {
        self.error_details().map(|e| &e.kind)
    }
}

impl From<ErrorDetails> for ResultEnvelope {
    fn from(error: ErrorDetails) -> Self {
        ResultEnvelope::Error { error }
    }
}

/// Error document a worker writes to stderr before exiting non-zero.
#[derive(Debug, Deserialize)]
struct WorkerErrorDocument {
    #[serde(rename = "Error", alias = "error")]
    error: WorkerErrorBody,
}

#[derive(Debug, Deserialize)]
struct WorkerErrorBody {
    #[serde(rename = "Type", alias = "type")]
    kind: String,
    #[serde(rename = "Message", alias = "message", default)]
    message: Option<String>,
    #[serde(rename = "Details", alias = "details", default)]
    details: Option<String>,
}

impl From<WorkerErrorBody> for ErrorDetails {
    fn from(body: WorkerErrorBody) -> Self {
        ErrorDetails {
            kind: ErrorKind::from(body.kind),
            message: body.message.unwrap_or_default(),
            details: body.details,
        }
    }
}

/// Parse a worker's stderr error document.
///
/// Returns `None` when the text is not a structured error report.
pub fn parse_worker_error(text: &str) -> Option<ErrorDetails> {
    serde_json::from_str::<WorkerErrorDocument>(text)
        .ok()
        .map(|doc| doc.error.into())
}

/// Success document printed on stdout by the tabular workers.
#[derive(Debug, Deserialize)]
struct WorkerSuccessDocument {
    #[serde(rename = "Status", alias = "status")]
    status: String,
    #[serde(rename = "Data", alias = "data")]
    data: String,
}

/// Unwrap a worker-side envelope printed on stdout.
///
/// A success document yields its `Data`; an error document is passed
/// through; anything else is a `PARSE_ERROR` carrying the raw text.
pub fn unwrap_worker_envelope(stdout: &str) -> ResultEnvelope {
    if let Ok(doc) = serde_json::from_str::<WorkerSuccessDocument>(stdout)
        && doc.status.eq_ignore_ascii_case("success")
    {
        return ResultEnvelope::success(doc.data);
    }
    if let Some(error) = parse_worker_error(stdout) {
        return error.into();
    }
    ResultEnvelope::error(
        ErrorKind::ParseError,
        "Failed to parse success response",
        stdout,
    )
}
