use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Job '{0}' has not completed yet")]
    NotReady(String),

    #[error("Job '{job_id}' cannot be modified: {reason}")]
    InvalidState { job_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::db::DatabaseError),

    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl EngineError {
    pub(crate) fn job_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }

    pub(crate) fn upload_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Upload",
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_state(job_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            job_id: job_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Errors raised by a [`crate::processor::TextExtractor`].
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("failed to process DOCX: {0}")]
    DocxProcessing(String),

    #[error("failed to decode text: {0}")]
    Encoding(String),

    #[error("{0}")]
    Failed(String),

    #[error("extractor task failed: {0}")]
    Internal(String),
}

/// Failure reported by a remote collaborator (embedding model, vector store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised by a [`crate::profile::ProfileExtractor`].
///
/// `Service` means the call itself failed; `Malformed` means the service
/// answered but the payload could not be turned into a profile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("profile extractor call failed: {0}")]
    Service(String),

    #[error("profile extractor returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Job '{0}' already has an execution in flight")]
    AlreadyRunning(String),
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    Logger(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
