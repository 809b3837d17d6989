//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tracing::info;

use crate::service::OperationService;

use super::routes::routes;

/// Default request body limit: 50 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Origin of the browser client during development.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
    /// Browser origin allowed to call the API cross-origin.
    pub cors_origin: HeaderValue,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5058,
            body_limit: DEFAULT_BODY_LIMIT,
            cors_origin: HeaderValue::from_static(DEFAULT_CORS_ORIGIN),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn with_cors_origin(mut self, origin: &str) -> anyhow::Result<Self> {
        self.cors_origin = HeaderValue::from_str(origin)?;
        Ok(self)
    }
}

/// Start the HTTP server with provided service.
pub async fn serve(config: ServerConfig, service: Arc<OperationService>) -> anyhow::Result<()> {
    let snapshot = service.health();
    for op in snapshot.operations.iter().filter(|op| !op.available) {
        tracing::warn!(operation = op.id, worker = %op.worker, "Worker program not found");
    }

    let app = routes(service, &config);

    let listener = TcpListener::bind(config.addr()?).await?;
    let actual_addr = listener.local_addr()?;

    info!("Starting datadock server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
///
/// If a handler cannot be installed, that signal is logged and ignored; the
/// server keeps running on the remaining one.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5058);
        assert_eq!(config.body_limit, 50 * 1024 * 1024);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:5058");
        assert_eq!(config.cors_origin, "http://localhost:3000");
    }

    #[test]
    fn bad_host_is_rejected() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.addr().is_err());
    }

    #[test]
    fn cors_origin_must_be_a_header_value() {
        let config = ServerConfig::default()
            .with_cors_origin("https://app.example.com")
            .unwrap();
        assert_eq!(config.cors_origin, "https://app.example.com");
        assert!(ServerConfig::default().with_cors_origin("bad\norigin").is_err());
    }
}
