use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{AnalyzeError, ExtractError, ServiceError};
use crate::job::FailureKind;

/// Why a pipeline run ended in `failed`. Never escapes the runner: it is
/// classified, persisted on the job row and broadcast.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Stored document '{0}' is no longer available")]
    DocumentUnavailable(String),

    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("{stage} timed out after {}s", .after.as_secs_f64())]
    Timeout { stage: &'static str, after: Duration },

    #[error("No text extracted from document")]
    NoText,

    #[error("Embedding of chunk {index} failed: {source}")]
    Embedding {
        index: usize,
        #[source]
        source: ServiceError,
    },

    #[error("Embedding deadline exceeded after {completed} of {total} chunks")]
    EmbeddingDeadline { completed: usize, total: usize },

    #[error("Profile analysis failed: {0}")]
    Analysis(AnalyzeError),

    #[error("Job storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Job left the expected state: {0}")]
    Lost(String),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

impl StageError {
    /// Failure classification persisted next to the message.
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Extraction(
                ExtractError::UnsupportedFormat(_)
                | ExtractError::PdfProcessing(_)
                | ExtractError::DocxProcessing(_)
                | ExtractError::Encoding(_),
            ) => FailureKind::InvalidDocument,
            StageError::Extraction(_) => FailureKind::ExternalService,
            StageError::DocumentUnavailable(_) | StageError::NoText => {
                FailureKind::InvalidDocument
            }
            StageError::Timeout { .. }
            | StageError::Embedding { .. }
            | StageError::EmbeddingDeadline { .. } => FailureKind::ExternalService,
            StageError::Analysis(AnalyzeError::Service(_)) => FailureKind::ExternalService,
            StageError::Analysis(AnalyzeError::Malformed(_)) => FailureKind::Parse,
            StageError::Storage(_) => FailureKind::Storage,
            StageError::Lost(_) | StageError::Panicked(_) => FailureKind::Internal,
        }
    }
}

/// Non-fatal problems collected during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    VectorStoreFailed { error: String },
}
