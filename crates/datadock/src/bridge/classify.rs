//! Turn a finished worker process into a [`ResultEnvelope`].

use crate::envelope::{ErrorKind, ResultEnvelope, parse_worker_error};

/// Everything a worker left behind once it has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Classify a completed invocation.
///
/// - exit 0: success, stdout passed through unmodified
/// - non-zero with a structured error on stderr: that error, verbatim
/// - non-zero otherwise: `PARSE_ERROR` carrying the raw stderr
pub fn classify(outcome: ProcessOutcome) -> ResultEnvelope {
    if outcome.succeeded() {
        return match String::from_utf8(outcome.stdout) {
            Ok(data) => ResultEnvelope::success(data),
            Err(e) => ResultEnvelope::error(
                ErrorKind::ParseError,
                "Worker output is not valid UTF-8",
                String::from_utf8_lossy(e.as_bytes()),
            ),
        };
    }

    let stderr = String::from_utf8_lossy(&outcome.stderr);
    match parse_worker_error(&stderr) {
        Some(error) => {
            tracing::warn!(
                exit_code = ?outcome.exit_code,
                kind = %error.kind,
                message = %error.message,
                "Worker reported failure"
            );
            error.into()
        }
        None => {
            tracing::warn!(
                exit_code = ?outcome.exit_code,
                stderr_len = outcome.stderr.len(),
                "Worker failed without a structured error"
            );
            ResultEnvelope::error(
                ErrorKind::ParseError,
                "Failed to parse error response",
                stderr,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ErrorDetails;

    fn outcome(exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    #[test]
    fn exit_zero_passes_stdout_through_exactly() {
        let stdout = b"[{\"table_index\": 0}]\n  trailing  ";
        let envelope = classify(outcome(Some(0), stdout, b""));
        assert_eq!(
            envelope,
            ResultEnvelope::success("[{\"table_index\": 0}]\n  trailing  ")
        );
    }

    #[test]
    fn exit_zero_ignores_stderr_noise() {
        let envelope = classify(outcome(Some(0), b"ok", b"FutureWarning: something"));
        assert_eq!(envelope.data(), Some("ok"));
    }

    #[test]
    fn exit_zero_with_empty_stdout_is_empty_success() {
        assert_eq!(
            classify(outcome(Some(0), b"", b"")),
            ResultEnvelope::success("")
        );
    }

    #[test]
    fn exit_zero_non_utf8_is_parse_error() {
        let envelope = classify(outcome(Some(0), &[0x61, 0xff], b""));
        assert_eq!(envelope.error_kind(), Some(&ErrorKind::ParseError));
    }

    #[test]
    fn structured_stderr_is_returned_verbatim() {
        let stderr = br#"{"Status": "error", "Error": {"Type": "DECODE_ERROR", "Message": "Invalid base64 data", "Details": "Incorrect padding"}}"#;
        let envelope = classify(outcome(Some(1), b"", stderr));
        assert_eq!(
            envelope.error_details(),
            Some(&ErrorDetails {
                kind: ErrorKind::Worker("DECODE_ERROR".to_string()),
                message: "Invalid base64 data".to_string(),
                details: Some("Incorrect padding".to_string()),
            })
        );
    }

    #[test]
    fn unstructured_stderr_is_parse_error_with_raw_text() {
        let stderr = b"Traceback (most recent call last):\n  ModuleNotFoundError: pandas\n";
        let envelope = classify(outcome(Some(2), b"partial", stderr));
        let error = envelope.error_details().unwrap();
        assert_eq!(error.kind, ErrorKind::ParseError);
        assert_eq!(
            error.details.as_deref(),
            Some("Traceback (most recent call last):\n  ModuleNotFoundError: pandas\n")
        );
    }

    #[test]
    fn signal_termination_is_failure() {
        let envelope = classify(outcome(None, b"half a tab", b""));
        assert!(!envelope.is_success());
        assert_eq!(envelope.error_kind(), Some(&ErrorKind::ParseError));
    }
}
