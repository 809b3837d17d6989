//! Payload builder: validates a raw request and shapes it into the canonical
//! payload its worker expects.
//!
//! Validation is entirely local. Nothing in this module touches a process,
//! so a request rejected here never reaches the bridge.
//!
//! Per-operation layouts:
//!
//! | operation        | stdin                                                         | argv          |
//! |------------------|---------------------------------------------------------------|---------------|
//! | `info`           | `{csv_data}`                                                  |               |
//! | `clean`          | `{csv_data, method, column, value, target_type, limit}`       |               |
//! | `vis_data`       | `{csv_data, method, target_column, selected_cols}`            |               |
//! | `extract_tables` | base64 document + newline                                     | `.pdf`/`.docx`|
//! | `html_data`      | URL + newline                                                 |               |

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};

use crate::bridge::WorkerInput;
use crate::envelope::{ErrorDetails, ErrorKind};
use crate::registry::{InputClass, OperationDescriptor, PayloadSchema};

/// Raw request input as received by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    File { file_name: String, bytes: Vec<u8> },
    Url(String),
}

impl RawInput {
    pub fn file(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawInput::File {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        RawInput::Url(url.into())
    }
}

/// A request for one operation.
#[derive(Debug, Clone)]
pub struct Request {
    pub operation: String,
    pub input: RawInput,
    /// Options as the client sent them (a JSON document), if any.
    pub options: Option<String>,
}

impl Request {
    pub fn new(operation: impl Into<String>, input: RawInput) -> Self {
        Self {
            operation: operation.into(),
            input,
            options: None,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid file extension {found:?}")]
    InvalidExtension {
        found: String,
        supported: &'static [&'static str],
    },
    #[error("file is not valid UTF-8 text: {0}")]
    NotText(#[from] std::string::FromUtf8Error),
    #[error("no URL provided")]
    EmptyUrl,
    #[error("operation {operation} expects {expected}")]
    WrongInputKind {
        operation: &'static str,
        expected: &'static str,
    },
    #[error("operation {operation} requires options")]
    MissingOptions { operation: &'static str },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl From<ValidationError> for ErrorDetails {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidExtension { supported, .. } => ErrorDetails::new(
                ErrorKind::InvalidFile,
                "Invalid file extension",
                format!("Supported extensions: {}", supported.join(",")),
            ),
            ValidationError::NotText(e) => {
                ErrorDetails::new(ErrorKind::InvalidFile, "Invalid file content", e.to_string())
            }
            ValidationError::EmptyUrl => ErrorDetails::new(
                ErrorKind::InvalidFile,
                "No URL provided",
                "The URL must not be empty or whitespace",
            ),
            ValidationError::WrongInputKind {
                operation,
                expected,
            } => ErrorDetails::new(
                ErrorKind::InvalidFile,
                "Invalid input for operation",
                format!("Operation {operation} expects {expected}"),
            ),
            ValidationError::MissingOptions { operation } => ErrorDetails::new(
                ErrorKind::InvalidOperation,
                "Invalid operation or missing options",
                format!("Operation: {operation}, Options provided: false"),
            ),
            ValidationError::InvalidOptions(msg) => ErrorDetails::new(
                ErrorKind::InvalidJsonOrOptions,
                "Invalid JSON format or options",
                msg,
            ),
        }
    }
}

/// Deserialize a field that must be present but may be `null`.
///
/// Serde treats a missing `Option` field as `None`; routing through
/// `deserialize_with` makes absence a `missing field` error instead.
fn required_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Scalar fill value, passed to the worker as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

/// The `value` option of a clean request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CleanValue {
    /// Replace `oldVal` with `newVal`.
    Replace {
        #[serde(rename = "oldVal", deserialize_with = "required_nullable")]
        old_val: Option<String>,
        #[serde(rename = "newVal", deserialize_with = "required_nullable")]
        new_val: Option<String>,
    },
    Scalar(ScalarValue),
}

#[derive(Debug, Deserialize)]
struct CleanOptions {
    #[serde(deserialize_with = "required_nullable")]
    method: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    column: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    value: Option<CleanValue>,
    #[serde(deserialize_with = "required_nullable")]
    target_type: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VisOptions {
    #[serde(deserialize_with = "required_nullable")]
    method: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    target_column: Option<String>,
    selected_cols: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoPayload {
    pub csv_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanPayload {
    pub csv_data: String,
    pub method: Option<String>,
    pub column: Option<String>,
    pub value: Option<CleanValue>,
    pub target_type: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisPayload {
    pub csv_data: String,
    pub method: Option<String>,
    pub target_column: Option<String>,
    pub selected_cols: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPayload {
    /// Lower-cased extension including the dot, e.g. `.pdf`.
    pub extension: String,
    /// Standard base64 of the document bytes.
    pub document: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebPagePayload {
    pub url: String,
}

/// Fixed-shape payload for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalPayload {
    Info(InfoPayload),
    Clean(CleanPayload),
    Visualize(VisPayload),
    DocumentTables(DocumentPayload),
    WebPage(WebPagePayload),
}

impl CanonicalPayload {
    /// Serialize into what the worker reads: argv plus stdin bytes.
    pub fn encode(&self) -> serde_json::Result<WorkerInput> {
        let input = match self {
            CanonicalPayload::Info(p) => WorkerInput::stdin(serde_json::to_vec(p)?),
            CanonicalPayload::Clean(p) => WorkerInput::stdin(serde_json::to_vec(p)?),
            CanonicalPayload::Visualize(p) => WorkerInput::stdin(serde_json::to_vec(p)?),
            CanonicalPayload::DocumentTables(p) => {
                WorkerInput::stdin(format!("{}\n", p.document)).with_arg(p.extension.clone())
            }
            CanonicalPayload::WebPage(p) => WorkerInput::stdin(format!("{}\n", p.url)),
        };
        Ok(input)
    }
}

/// Validate `input` and `options` for `operation` and build its payload.
///
/// Shape checks run first, then options presence, then options parsing.
pub fn build(
    operation: &OperationDescriptor,
    input: RawInput,
    options: Option<&str>,
) -> Result<CanonicalPayload, ValidationError> {
    match operation.schema {
        PayloadSchema::Info => {
            let csv_data = tabular_text(operation, input)?;
            Ok(CanonicalPayload::Info(InfoPayload { csv_data }))
        }
        PayloadSchema::Clean => {
            let csv_data = tabular_text(operation, input)?;
            let opts: CleanOptions = parse_options(operation, options)?;
            Ok(CanonicalPayload::Clean(CleanPayload {
                csv_data,
                method: opts.method,
                column: opts.column,
                value: opts.value,
                target_type: opts.target_type,
                limit: opts.limit,
            }))
        }
        PayloadSchema::Visualize => {
            let csv_data = tabular_text(operation, input)?;
            let opts: VisOptions = parse_options(operation, options)?;
            Ok(CanonicalPayload::Visualize(VisPayload {
                csv_data,
                method: opts.method,
                target_column: opts.target_column,
                selected_cols: opts.selected_cols,
            }))
        }
        PayloadSchema::DocumentTables => {
            let (file_name, bytes) = expect_file(operation, input)?;
            let extension = checked_extension(&file_name, InputClass::Document)?;
            let document = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Ok(CanonicalPayload::DocumentTables(DocumentPayload {
                extension,
                document,
            }))
        }
        PayloadSchema::WebPage => {
            let RawInput::Url(url) = input else {
                return Err(ValidationError::WrongInputKind {
                    operation: operation.id,
                    expected: "a URL",
                });
            };
            let url = url.trim();
            if url.is_empty() {
                return Err(ValidationError::EmptyUrl);
            }
            Ok(CanonicalPayload::WebPage(WebPagePayload {
                url: url.to_string(),
            }))
        }
    }
}

fn expect_file(
    operation: &OperationDescriptor,
    input: RawInput,
) -> Result<(String, Vec<u8>), ValidationError> {
    match input {
        RawInput::File { file_name, bytes } => Ok((file_name, bytes)),
        RawInput::Url(_) => Err(ValidationError::WrongInputKind {
            operation: operation.id,
            expected: "a file upload",
        }),
    }
}

fn tabular_text(
    operation: &OperationDescriptor,
    input: RawInput,
) -> Result<String, ValidationError> {
    let (file_name, bytes) = expect_file(operation, input)?;
    checked_extension(&file_name, InputClass::Tabular)?;
    Ok(String::from_utf8(bytes)?)
}

/// Return the lower-cased extension (with leading dot) if `class` accepts it.
fn checked_extension(file_name: &str, class: InputClass) -> Result<String, ValidationError> {
    let supported = class.extensions();
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    if supported.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(ValidationError::InvalidExtension {
            found: extension,
            supported,
        })
    }
}

fn parse_options<T: serde::de::DeserializeOwned>(
    operation: &OperationDescriptor,
    options: Option<&str>,
) -> Result<T, ValidationError> {
    let raw = match options.filter(|o| !o.trim().is_empty()) {
        Some(raw) => raw,
        None if operation.schema.requires_options() => {
            return Err(ValidationError::MissingOptions {
                operation: operation.id,
            });
        }
        None => "{}",
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::InvalidOptions(e.to_string()))?;
    if !value.is_object() {
        return Err(ValidationError::InvalidOptions(
            "options must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| ValidationError::InvalidOptions(e.to_string()))
}
