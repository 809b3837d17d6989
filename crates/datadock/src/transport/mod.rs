//! Transport layer for datadock.
//!
//! Currently provides the HTTP transport via axum.

pub mod http;

pub use http::{ServerConfig, serve};
