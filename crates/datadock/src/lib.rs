//! datadock: bridge between HTTP requests and external computation workers.
//!
//! A request names an operation; the [`OperationRegistry`] maps it to a worker
//! program, [`payload::build`] validates the raw input into a fixed-shape
//! payload, and the [`ProcessBridge`] runs the worker over stdin/stdout/stderr.
//! Every outcome is a [`ResultEnvelope`].

pub mod bridge;
pub mod config;
pub mod envelope;
pub mod payload;
pub mod registry;
pub mod service;
pub mod transport;
mod version;

pub use bridge::{Executor, ProcessBridge, WorkerInput};
pub use config::{ConfigError, ServiceConfig};
pub use envelope::{ErrorDetails, ErrorKind, ResultEnvelope};
pub use payload::{RawInput, Request, ValidationError};
pub use registry::{OperationDescriptor, OperationRegistry, RegistryError};
pub use service::{HealthSnapshot, OperationService};
pub use transport::{ServerConfig, serve};
pub use version::{DATADOCK_VERSION, VersionInfo};
