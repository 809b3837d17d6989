//! Operation registry: which worker program implements which operation.
//!
//! Built once at startup from [`ServiceConfig`] and shared read-only
//! afterwards, so concurrent requests can resolve without locking.

use std::path::{Path, PathBuf};

use crate::config::ServiceConfig;
use crate::envelope::{ErrorDetails, ErrorKind};

/// Shape of raw input an operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// `.csv` upload.
    Tabular,
    /// `.pdf` / `.docx` upload.
    Document,
    /// Non-empty URL string.
    WebPage,
}

impl InputClass {
    /// File extensions accepted for this class. Empty for URL input.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            InputClass::Tabular => &[".csv"],
            InputClass::Document => &[".pdf", ".docx"],
            InputClass::WebPage => &[],
        }
    }
}

/// Canonical payload layout for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSchema {
    Info,
    Clean,
    Visualize,
    DocumentTables,
    WebPage,
}

impl PayloadSchema {
    pub fn input_class(&self) -> InputClass {
        match self {
            PayloadSchema::Info | PayloadSchema::Clean | PayloadSchema::Visualize => {
                InputClass::Tabular
            }
            PayloadSchema::DocumentTables => InputClass::Document,
            PayloadSchema::WebPage => InputClass::WebPage,
        }
    }

    /// Whether the operation cannot run without structured options.
    pub fn requires_options(&self) -> bool {
        matches!(self, PayloadSchema::Clean | PayloadSchema::Visualize)
    }
}

/// What a successful worker prints on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Handed back to the caller untouched.
    Opaque,
    /// A `{"Status": "success", "Data": ...}` document to unwrap.
    WorkerEnvelope,
}

/// Location of a worker program and how to start it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    pub program: PathBuf,
    pub interpreter: Option<String>,
}

impl WorkerRef {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            interpreter: None,
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn exists(&self) -> bool {
        self.program.is_file()
    }

    /// Short name for logs.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Static description of one operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub id: &'static str,
    pub schema: PayloadSchema,
    pub worker: WorkerRef,
    pub output: OutputFormat,
}

impl OperationDescriptor {
    pub fn input_class(&self) -> InputClass {
        self.schema.input_class()
    }
}

/// Fixed operation table: id, payload schema, worker program, stdout format.
const OPERATIONS: &[(&str, PayloadSchema, &str, OutputFormat)] = &[
    (
        "info",
        PayloadSchema::Info,
        "info_script.py",
        OutputFormat::WorkerEnvelope,
    ),
    (
        "clean",
        PayloadSchema::Clean,
        "cleaning_script.py",
        OutputFormat::WorkerEnvelope,
    ),
    (
        "vis_data",
        PayloadSchema::Visualize,
        "visualisation_data.py",
        OutputFormat::WorkerEnvelope,
    ),
    (
        "extract_tables",
        PayloadSchema::DocumentTables,
        "table_extractor.py",
        OutputFormat::Opaque,
    ),
    (
        "html_data",
        PayloadSchema::WebPage,
        "html_data.py",
        OutputFormat::Opaque,
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

impl From<RegistryError> for ErrorDetails {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownOperation(id) => ErrorDetails::new(
                ErrorKind::InvalidOperation,
                "Unknown operation",
                format!("Operation: {id}"),
            ),
        }
    }
}

/// Immutable operation id → descriptor table.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: Vec<OperationDescriptor>,
}

impl OperationRegistry {
    /// Build the standard table, resolving worker programs against the
    /// configured directory and interpreter.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::with_worker_dir(&config.worker_dir, config.interpreter.as_deref())
    }

    pub fn with_worker_dir(worker_dir: &Path, interpreter: Option<&str>) -> Self {
        let operations = OPERATIONS
            .iter()
            .map(|&(id, schema, program, output)| {
                let mut worker = WorkerRef::new(worker_dir.join(program));
                if let Some(interpreter) = interpreter {
                    worker = worker.with_interpreter(interpreter);
                }
                OperationDescriptor {
                    id,
                    schema,
                    worker,
                    output,
                }
            })
            .collect();
        Self { operations }
    }

    pub fn resolve(&self, id: &str) -> Result<&OperationDescriptor, RegistryError> {
        self.operations
            .iter()
            .find(|op| op.id == id)
            .ok_or_else(|| RegistryError::UnknownOperation(id.to_string()))
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OperationRegistry {
        OperationRegistry::with_worker_dir(Path::new("/srv/workers"), Some("python3"))
    }

    #[test]
    fn resolves_every_known_operation() {
        let registry = registry();
        for id in ["info", "clean", "vis_data", "extract_tables", "html_data"] {
            let op = registry.resolve(id).unwrap();
            assert_eq!(op.id, id);
        }
        assert_eq!(registry.operations().count(), 5);
    }

    #[test]
    fn worker_paths_join_the_worker_dir() {
        let registry = registry();
        let clean = registry.resolve("clean").unwrap();
        assert_eq!(
            clean.worker.program,
            PathBuf::from("/srv/workers/cleaning_script.py")
        );
        assert_eq!(clean.worker.interpreter.as_deref(), Some("python3"));
        assert_eq!(clean.worker.name(), "cleaning_script.py");
    }

    #[test]
    fn no_interpreter_executes_directly() {
        let registry = OperationRegistry::with_worker_dir(Path::new("bin"), None);
        assert!(registry.resolve("info").unwrap().worker.interpreter.is_none());
    }

    #[test]
    fn classes_and_output_formats() {
        let registry = registry();
        let info = registry.resolve("info").unwrap();
        assert_eq!(info.input_class(), InputClass::Tabular);
        assert_eq!(info.output, OutputFormat::WorkerEnvelope);

        let tables = registry.resolve("extract_tables").unwrap();
        assert_eq!(tables.input_class(), InputClass::Document);
        assert_eq!(tables.output, OutputFormat::Opaque);

        let html = registry.resolve("html_data").unwrap();
        assert_eq!(html.input_class(), InputClass::WebPage);
        assert!(html.input_class().extensions().is_empty());
    }

    #[test]
    fn only_clean_and_vis_data_require_options() {
        let registry = registry();
        let requiring: Vec<_> = registry
            .operations()
            .filter(|op| op.schema.requires_options())
            .map(|op| op.id)
            .collect();
        assert_eq!(requiring, vec!["clean", "vis_data"]);
    }

    #[test]
    fn unknown_operation_is_reported() {
        let err = registry().resolve("explode").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownOperation(ref id) if id == "explode"));

        let details = ErrorDetails::from(err);
        assert_eq!(details.kind, ErrorKind::InvalidOperation);
        assert_eq!(details.details.as_deref(), Some("Operation: explode"));
    }

    #[test]
    fn lookup_is_exact() {
        assert!(registry().resolve("INFO").is_err());
        assert!(registry().resolve("").is_err());
    }
}
