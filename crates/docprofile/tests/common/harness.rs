//! Test harness wiring an [`Orchestrator`] to an in-memory database.
//!
//! Collaborators default to the real document extractor, hashing embedder
//! and SQLite vector store, with a recording fake in place of the language
//! model. Individual tests swap in fakes through the builder methods.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use docprofile::config::EngineConfig;
use docprofile::{
    Collaborators, Database, DocumentExtractor, EmbeddingGenerator, HashingEmbedder, JobSnapshot,
    NewUpload, Orchestrator, ProfileExtractor, SqliteVectorStore, TextExtractor, Upload,
    VectorStore,
};

use super::builders::test_config;
use super::fakes::RecordingProfileExtractor;

pub const OWNER: &str = "owner-1";

/// How long a test waits for a job before giving up.
pub const JOB_WAIT: Duration = Duration::from_secs(15);

pub struct TestHarness {
    pub db: Database,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness with default collaborators and [`test_config`].
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Stores a plain-text document for [`OWNER`].
    pub fn upload_text(&self, text: &str) -> Upload {
        self.upload("resume.txt", text.as_bytes().to_vec())
    }

    /// Stores a document for [`OWNER`], detecting its MIME type from `filename`.
    pub fn upload(&self, filename: &str, content: Vec<u8>) -> Upload {
        self.orchestrator
            .store_upload(NewUpload::new(OWNER, filename, content))
            .expect("store upload")
    }

    /// Submits an upload for [`OWNER`].
    pub fn submit(&self, upload: &Upload) -> String {
        self.orchestrator
            .submit(&upload.upload_id, OWNER)
            .expect("submit job")
    }

    /// Waits for the job to finish and its execution to exit.
    pub async fn finish(&self, job_id: &str) -> JobSnapshot {
        let snapshot = self
            .orchestrator
            .wait_for_terminal(job_id, JOB_WAIT)
            .await
            .expect("job status");
        assert!(
            snapshot.is_terminal(),
            "job {} still {} after {:?}",
            job_id,
            snapshot.status,
            JOB_WAIT
        );
        snapshot
    }

    /// Uploads `text`, submits it and waits for the terminal state.
    pub async fn run_text(&self, text: &str) -> JobSnapshot {
        let upload = self.upload_text(text);
        let job_id = self.submit(&upload);
        self.finish(&job_id).await
    }
}

pub struct HarnessBuilder {
    db: Database,
    config: EngineConfig,
    extractor: Option<Arc<dyn TextExtractor>>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    profile_extractor: Option<Arc<dyn ProfileExtractor>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("open in-memory database"),
            config: test_config(),
            extractor: None,
            embedder: None,
            vector_store: None,
            profile_extractor: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    pub fn profile_extractor(mut self, profile_extractor: Arc<dyn ProfileExtractor>) -> Self {
        self.profile_extractor = Some(profile_extractor);
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> TestHarness {
        let db = self.db;
        let collaborators = Collaborators {
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(DocumentExtractor::new())),
            embedder: self
                .embedder
                .unwrap_or_else(|| Arc::new(HashingEmbedder::default())),
            vector_store: self
                .vector_store
                .unwrap_or_else(|| Arc::new(SqliteVectorStore::new(db.clone()))),
            profile_extractor: self
                .profile_extractor
                .unwrap_or_else(|| Arc::new(RecordingProfileExtractor::default())),
        };

        let orchestrator = Orchestrator::new(db.clone(), self.config, collaborators)
            .expect("create orchestrator");
        TestHarness { db, orchestrator }
    }
}
