//! Job state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an analysis job.
///
/// `Completed` and `Failed` are terminal. The pipeline only ever moves
/// forward through the stage states; the single backwards edge is
/// `Failed -> Queued`, taken by a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    ExtractingText,
    Chunking,
    GeneratingEmbeddings,
    Analyzing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::ExtractingText,
        JobStatus::Chunking,
        JobStatus::GeneratingEmbeddings,
        JobStatus::Analyzing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::ExtractingText => "extracting_text",
            JobStatus::Chunking => "chunking",
            JobStatus::GeneratingEmbeddings => "generating_embeddings",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Progress written when a job enters this state.
    pub fn entry_progress(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::ExtractingText => 10,
            JobStatus::Chunking => 30,
            JobStatus::GeneratingEmbeddings => 50,
            JobStatus::Analyzing => 70,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, ExtractingText)
            | (ExtractingText, Chunking)
            | (Chunking, GeneratingEmbeddings)
            | (GeneratingEmbeddings, Analyzing)
            | (Analyzing, Completed)
            | (Failed, Queued) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a pipeline failure, persisted next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A collaborator call failed or timed out.
    ExternalService,
    /// The profile extractor answered with unusable data.
    Parse,
    /// The document itself yielded nothing to analyze.
    InvalidDocument,
    /// The job repository failed mid-run.
    Storage,
    /// Anything else: panics, interrupted runs, pool shutdown.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExternalService => "external_service",
            FailureKind::Parse => "parse",
            FailureKind::InvalidDocument => "invalid_document",
            FailureKind::Storage => "storage",
            FailureKind::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            FailureKind::ExternalService,
            FailureKind::Parse,
            FailureKind::InvalidDocument,
            FailureKind::Storage,
            FailureKind::Internal,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
