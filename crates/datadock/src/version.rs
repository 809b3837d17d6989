//! Version information for datadock.

/// Datadock version from Cargo.toml
pub const DATADOCK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub datadock: &'static str,
    /// Interpreter the workers run under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            datadock: DATADOCK_VERSION,
            interpreter: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_has_crate_version() {
        let info = VersionInfo::new();
        assert_eq!(info.datadock, DATADOCK_VERSION);
        assert!(info.interpreter.is_none());
    }

    #[test]
    fn version_info_serializes_minimal() {
        let info = VersionInfo {
            datadock: "0.1.0",
            interpreter: None,
        };
        insta::assert_json_snapshot!(info, @r#"
        {
          "datadock": "0.1.0"
        }
        "#);
    }

    #[test]
    fn version_info_serializes_interpreter() {
        let info = VersionInfo {
            datadock: "0.1.0",
            interpreter: None,
        }
        .with_interpreter(Some("python3".to_string()));
        insta::assert_json_snapshot!(info, @r#"
        {
          "datadock": "0.1.0",
          "interpreter": "python3"
        }
        "#);
    }
}
