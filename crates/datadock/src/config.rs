//! Runtime configuration for the worker bridge.

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the worker programs, relative to the working directory.
pub const DEFAULT_WORKER_DIR: &str = "workers";

/// Default interpreter the worker programs are started with.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Default upper bound on a single worker invocation.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// How workers are located and how long they may run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub worker_dir: PathBuf,
    /// Interpreter used to start each worker program. `None` executes the
    /// program directly.
    pub interpreter: Option<String>,
    pub worker_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_dir: PathBuf::from(DEFAULT_WORKER_DIR),
            interpreter: Some(DEFAULT_INTERPRETER.to_string()),
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    pub fn new(worker_dir: impl Into<PathBuf>) -> Self {
        Self {
            worker_dir: worker_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Overlay `DATADOCK_WORKER_DIR`, `DATADOCK_INTERPRETER` and
    /// `DATADOCK_TIMEOUT_SECS` from the environment.
    ///
    /// An empty `DATADOCK_INTERPRETER` means "execute workers directly".
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup("DATADOCK_WORKER_DIR") {
            self.worker_dir = PathBuf::from(dir);
        }
        if let Some(interpreter) = lookup("DATADOCK_INTERPRETER") {
            self.interpreter = if interpreter.trim().is_empty() {
                None
            } else {
                Some(interpreter)
            };
        }
        if let Some(secs) = lookup("DATADOCK_TIMEOUT_SECS") {
            self.worker_timeout = parse_timeout_secs("DATADOCK_TIMEOUT_SECS", &secs)?;
        }
        Ok(self)
    }
}

/// Parse a positive number of seconds.
pub fn parse_timeout_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.trim().parse().map_err(|e| ConfigError::InvalidValue {
        name,
        reason: format!("{value:?}: {e}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
