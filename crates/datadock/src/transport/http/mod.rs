//! HTTP transport: multipart endpoints over [`OperationService`](crate::service::OperationService).

mod routes;
mod server;

pub use routes::{HealthCheckResponse, routes};
pub use server::{ServerConfig, serve};
