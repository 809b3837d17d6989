//! HTTP route handlers.
//!
//! Each endpoint reads a multipart form, performs presence checks, and hands
//! a [`Request`] to the [`OperationService`]. The envelope comes back as JSON:
//! `200` on success, `400` on any error.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::envelope::{ErrorKind, ResultEnvelope};
use crate::payload::{RawInput, Request};
use crate::registry::InputClass;
use crate::service::{HealthSnapshot, OperationService, OperationStatus};
use crate::version::VersionInfo;

use super::server::ServerConfig;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub version: VersionInfo,
    pub operations: Vec<OperationStatus>,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: "READY",
            version: snapshot.version,
            operations: snapshot.operations,
        }
    }
}

#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

/// Fields collected from a multipart body.
#[derive(Debug, Default)]
struct Form {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl Form {
    /// Non-empty upload, if any.
    fn take_file(&mut self) -> Option<UploadedFile> {
        self.file.take().filter(|f| !f.bytes.is_empty())
    }

    /// Non-empty text field, if any.
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<Form, ResultEnvelope> {
    let mut multipart = multipart.map_err(|e| malformed(e.body_text()))?;
    let mut form = Form::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field.bytes().await.map_err(|e| malformed(e.body_text()))?;
            form.file = Some(UploadedFile {
                file_name,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(|e| malformed(e.body_text()))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

fn malformed(reason: String) -> ResultEnvelope {
    tracing::debug!(%reason, "Malformed multipart body");
    ResultEnvelope::error(
        ErrorKind::InvalidRequest,
        "Malformed form data",
        reason,
    )
}

fn invalid_request(message: &str, details: &str) -> ResultEnvelope {
    ResultEnvelope::error(ErrorKind::InvalidRequest, message, details)
}

fn respond(envelope: ResultEnvelope) -> Response {
    let status = if envelope.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(envelope)).into_response()
}

async fn health_check(State(service): State<Arc<OperationService>>) -> Json<HealthCheckResponse> {
    Json(service.health().into())
}

async fn upload(
    State(service): State<Arc<OperationService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(envelope) => return respond(envelope),
    };

    let Some(file) = form.take_file() else {
        return respond(invalid_request(
            "No file provided",
            "The request must include a file",
        ));
    };
    let Some(operation) = form.text("operation") else {
        return respond(invalid_request(
            "No operation specified",
            "The request must include an operation type",
        ));
    };

    // Document and web-page operations have their own endpoints.
    if let Ok(descriptor) = service.registry().resolve(operation)
        && descriptor.input_class() != InputClass::Tabular
    {
        return respond(ResultEnvelope::error(
            ErrorKind::InvalidOperation,
            "Operation not supported by this endpoint",
            format!("Operation: {operation}"),
        ));
    }

    let options = form.text("options").unwrap_or("{}");
    let request = Request::new(operation, RawInput::file(file.file_name, file.bytes))
        .with_options(options);
    respond(service.handle(request).await)
}

async fn html_data(
    State(service): State<Arc<OperationService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(envelope) => return respond(envelope),
    };

    let Some(url) = form.text("url") else {
        return respond(invalid_request(
            "No URL provided",
            "The request must include a URL",
        ));
    };

    respond(service.handle(Request::new("html_data", RawInput::url(url))).await)
}

async fn extract_tables(
    State(service): State<Arc<OperationService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(envelope) => return respond(envelope),
    };

    let Some(file) = form.take_file() else {
        return respond(invalid_request(
            "No file provided",
            "The request must include a document file",
        ));
    };

    let request = Request::new("extract_tables", RawInput::file(file.file_name, file.bytes));
    respond(service.handle(request).await)
}

pub fn routes(service: Arc<OperationService>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.clone())
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health-check", get(health_check))
        .route("/api/Main/Upload", post(upload))
        .route("/api/Main/htmlData", post(html_data))
        .route("/api/Main/ExtractTables", post(extract_tables))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(cors)
        .with_state(service)
}
