use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::{job_repo, profile_repo, timestamp, upload_repo, Database};
use crate::embedding::EmbeddingGenerator;
use crate::error::AnalyzeError;
use crate::job::{FailureKind, JobStatus};
use crate::processor::TextExtractor;
use crate::profile::{ProfileExtractor, UserProfile};
use crate::vector::{ChunkVector, VectorStore};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineWarning, StageError};
use super::progress::{ProgressEvent, ProgressReporter};

/// Progress reached when every embedding is done.
const EMBEDDINGS_DONE_PROGRESS: u8 = 55;
/// Progress reached once vector storage was attempted.
const VECTORS_DONE_PROGRESS: u8 = 60;

/// External services a pipeline run calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn EmbeddingGenerator>,
    pub vector_store: Arc<dyn VectorStore>,
    pub profile_extractor: Arc<dyn ProfileExtractor>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { kind: FailureKind, message: String },
}

pub struct Pipeline {
    db: Database,
    collaborators: Collaborators,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(db: Database, collaborators: Collaborators, config: Arc<PipelineConfig>) -> Self {
        Self {
            db,
            collaborators,
            config,
        }
    }

    /// Runs every stage of one job and persists the terminal state.
    ///
    /// Stage errors and panics never escape: they end up as a `failed` row.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (RunOutcome, PipelineContext) {
        let span = info_span!("pipeline", job_id = %ctx.job_id, attempt = ctx.attempt);

        let result = AssertUnwindSafe(self.execute(&mut ctx, progress).instrument(span.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(StageError::Panicked(panic_message(payload.as_ref()))));

        let outcome = match result {
            Ok(()) => {
                span.in_scope(|| info!(warnings = ctx.warnings.len(), "Job completed"));
                RunOutcome::Completed
            }
            Err(e) => span.in_scope(|| self.fail(&ctx, e, progress)),
        };

        (outcome, ctx)
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), StageError> {
        self.enter_stage(
            ctx,
            JobStatus::Queued,
            JobStatus::ExtractingText,
            "Extracting text",
            progress,
        )?;
        self.step_extract_text(ctx)
            .instrument(info_span!("extract_text"))
            .await?;

        self.enter_stage(
            ctx,
            JobStatus::ExtractingText,
            JobStatus::Chunking,
            "Splitting text into chunks",
            progress,
        )?;
        {
            let _step = info_span!("chunk_text").entered();
            self.step_chunk(ctx)?;
        }

        self.enter_stage(
            ctx,
            JobStatus::Chunking,
            JobStatus::GeneratingEmbeddings,
            "Generating embeddings",
            progress,
        )?;
        self.step_generate_embeddings(ctx, progress)
            .instrument(info_span!("generate_embeddings"))
            .await?;
        self.step_store_vectors(ctx, progress)
            .instrument(info_span!("store_vectors"))
            .await?;

        self.enter_stage(
            ctx,
            JobStatus::GeneratingEmbeddings,
            JobStatus::Analyzing,
            "Analyzing profile",
            progress,
        )?;
        self.step_analyze(ctx)
            .instrument(info_span!("analyze_profile"))
            .await?;

        progress.report(ProgressEvent::Completed);
        Ok(())
    }

    /// Moves the row into the next stage and announces it.
    fn enter_stage(
        &self,
        ctx: &PipelineContext,
        from: JobStatus,
        to: JobStatus,
        step: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(), StageError> {
        let moved = job_repo::advance(&self.db, &ctx.job_id, from, to, step, &timestamp())?;
        if !moved {
            return Err(StageError::Lost(format!(
                "expected '{}' before entering '{}'",
                from, to
            )));
        }

        debug!(status = %to, "Entered stage");
        progress.report(ProgressEvent::Stage {
            status: to,
            progress: to.entry_progress(),
            step: step.to_string(),
        });
        Ok(())
    }

    /// Records intra-stage progress. Stale values are silently dropped.
    fn advance_progress(
        &self,
        ctx: &PipelineContext,
        status: JobStatus,
        value: u8,
        step: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(), StageError> {
        if job_repo::record_progress(&self.db, &ctx.job_id, status, value, step, &timestamp())? {
            progress.report(ProgressEvent::Stage {
                status,
                progress: value,
                step: step.to_string(),
            });
        }
        Ok(())
    }

    async fn step_extract_text(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let upload = upload_repo::find_by_id(&self.db, &ctx.upload_id)?
            .ok_or_else(|| StageError::DocumentUnavailable(ctx.upload_id.clone()))?;

        let limit = self.config.extraction_timeout;
        let text = timeout(
            limit,
            self.collaborators
                .extractor
                .extract(&upload.content, &upload.mime_type),
        )
        .await
        .map_err(|_| StageError::Timeout {
            stage: "Text extraction",
            after: limit,
        })??;

        debug!(chars = text.chars().count(), mime_type = %upload.mime_type, "Extracted text");
        ctx.text = Some(text);
        Ok(())
    }

    fn step_chunk(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let text = ctx.text.as_deref().unwrap_or_default();
        if text.trim().is_empty() {
            return Err(StageError::NoText);
        }

        ctx.chunks = self.config.chunker.chunk(text);
        debug!(chunks = ctx.chunks.len(), "Chunked text");
        Ok(())
    }

    async fn step_generate_embeddings(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), StageError> {
        let deadline = Instant::now() + self.config.embedding_deadline;
        let call_limit = self.config.embedding_call_timeout;
        let total = ctx.chunks.len();
        let mut vectors = Vec::with_capacity(total);

        for (index, chunk) in ctx.chunks.iter().enumerate() {
            let call = timeout(call_limit, self.collaborators.embedder.embed(&chunk.text));
            let embedding = timeout_at(deadline, call)
                .await
                .map_err(|_| StageError::EmbeddingDeadline {
                    completed: index,
                    total,
                })?
                .map_err(|_| StageError::Timeout {
                    stage: "Embedding call",
                    after: call_limit,
                })?
                .map_err(|source| StageError::Embedding { index, source })?;

            vectors.push(ChunkVector {
                chunk_index: chunk.index,
                content: chunk.text.clone(),
                embedding,
            });

            let entry = JobStatus::GeneratingEmbeddings.entry_progress();
            let span = EMBEDDINGS_DONE_PROGRESS - entry;
            let value = entry + (usize::from(span) * (index + 1) / total) as u8;
            self.advance_progress(
                ctx,
                JobStatus::GeneratingEmbeddings,
                value,
                &format!("Generated embedding {}/{}", index + 1, total),
                progress,
            )?;
        }

        ctx.vectors = vectors;
        Ok(())
    }

    /// Best-effort: a failure is recorded as a warning and the run goes on.
    async fn step_store_vectors(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), StageError> {
        let limit = self.config.vector_store_timeout;
        let stored = match timeout(
            limit,
            self.collaborators
                .vector_store
                .store(&ctx.job_id, &ctx.vectors),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Vector storage failed, continuing without vectors: {}", e);
                ctx.warnings.push(PipelineWarning::VectorStoreFailed {
                    error: e.to_string(),
                });
                false
            }
            Err(_) => {
                warn!(
                    "Vector storage timed out after {:?}, continuing without vectors",
                    limit
                );
                ctx.warnings.push(PipelineWarning::VectorStoreFailed {
                    error: format!("timed out after {:?}", limit),
                });
                false
            }
        };

        let step = if stored {
            "Stored vectors"
        } else {
            "Vector storage skipped"
        };
        self.advance_progress(
            ctx,
            JobStatus::GeneratingEmbeddings,
            VECTORS_DONE_PROGRESS,
            step,
            progress,
        )
    }

    async fn step_analyze(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let text = ctx.text.as_deref().unwrap_or_default();
        let limit = self.config.analysis_timeout;

        let data = timeout(
            limit,
            self.collaborators
                .profile_extractor
                .analyze(text, ctx.profile_url.as_deref()),
        )
        .await
        .map_err(|_| StageError::Timeout {
            stage: "Profile analysis",
            after: limit,
        })?
        .map_err(StageError::Analysis)?;

        if data.is_empty() {
            return Err(StageError::Analysis(AnalyzeError::Malformed(
                "profile extractor returned an empty profile".to_string(),
            )));
        }

        let profile = UserProfile::new(&ctx.job_id, data);
        let job_id = ctx.job_id.clone();
        self.db.with_transaction(|tx| {
            if !job_repo::mark_completed(tx, &job_id, &timestamp())? {
                return Err(StageError::Lost(
                    "job was no longer analyzing at completion".to_string(),
                ));
            }
            profile_repo::insert_in(tx, &profile)?;
            Ok(())
        })
    }

    /// Persists a failure. A row that already left the running states is
    /// left untouched.
    fn fail(
        &self,
        ctx: &PipelineContext,
        err: StageError,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        let kind = err.kind();
        let message = err.to_string();
        warn!(kind = %kind, "Job failed: {}", message);

        match job_repo::mark_failed(&self.db, &ctx.job_id, &message, kind, &timestamp()) {
            Ok(true) => progress.report(ProgressEvent::Failed {
                error: message.clone(),
                kind,
            }),
            Ok(false) => debug!("Job already left the running states, failure not recorded"),
            Err(e) => error!("Failed to record job failure: {}", e),
        }

        RunOutcome::Failed { kind, message }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::JobRow;
    use crate::embedding::HashingEmbedder;
    use crate::error::{ExtractError, ServiceError};
    use crate::job::{NewUpload, Upload};
    use crate::pipeline::progress::NoopProgress;
    use crate::processor::DocumentExtractor;
    use crate::profile::ProfileData;
    use crate::vector::SqliteVectorStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedProfile;

    #[async_trait]
    impl ProfileExtractor for FixedProfile {
        async fn analyze(
            &self,
            full_text: &str,
            _url: Option<&str>,
        ) -> Result<ProfileData, AnalyzeError> {
            Ok(ProfileData {
                skills: vec!["Rust".to_string()],
                summary: full_text.lines().next().unwrap_or_default().to_string(),
                ..Default::default()
            })
        }
    }

    struct MalformedProfile;

    #[async_trait]
    impl ProfileExtractor for MalformedProfile {
        async fn analyze(&self, _: &str, _: Option<&str>) -> Result<ProfileData, AnalyzeError> {
            crate::profile::parse_profile_response("Sorry, I can't help with that.")
        }
    }

    struct PanickingExtractor;

    #[async_trait]
    impl TextExtractor for PanickingExtractor {
        async fn extract(&self, _: &[u8], _: &str) -> Result<String, ExtractError> {
            panic!("extractor exploded");
        }
    }

    struct PlainExtractor;

    #[async_trait]
    impl TextExtractor for PlainExtractor {
        async fn extract(&self, content: &[u8], _: &str) -> Result<String, ExtractError> {
            Ok(String::from_utf8_lossy(content).into_owned())
        }
    }

    struct FailingVectorStore;

    #[async_trait]
    impl VectorStore for FailingVectorStore {
        async fn store(&self, _: &str, _: &[ChunkVector]) -> Result<(), ServiceError> {
            Err(ServiceError::new("vector backend offline"))
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingGenerator for SlowEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>, ServiceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![1.0])
        }
    }

    /// Collects every reported progress value.
    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<u8>>,
    }

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            let value = match event {
                ProgressEvent::Stage { progress, .. } => progress,
                ProgressEvent::Completed => 100,
                ProgressEvent::Failed { .. } => return,
            };
            self.values.lock().unwrap().push(value);
        }
    }

    fn collaborators(db: &Database) -> Collaborators {
        Collaborators {
            extractor: Arc::new(DocumentExtractor::new()),
            embedder: Arc::new(HashingEmbedder::new(32)),
            vector_store: Arc::new(SqliteVectorStore::new(db.clone())),
            profile_extractor: Arc::new(FixedProfile),
        }
    }

    fn seed(db: &Database, content: &[u8], filename: &str) -> PipelineContext {
        let upload = Upload::from_new(NewUpload::new("owner-1", filename, content.to_vec()));
        upload_repo::insert(db, &upload).unwrap();
        let job_id = uuid::Uuid::new_v4().to_string();
        job_repo::insert(
            db,
            &JobRow::queued(&job_id, &upload.upload_id, "owner-1", None, &timestamp()),
        )
        .unwrap();
        PipelineContext::new(&job_id, &upload.upload_id, 1, None)
    }

    fn small_chunks() -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            chunker: crate::chunker::TextChunker::new(16, 4).unwrap(),
            ..PipelineConfig::default()
        })
    }

    fn row(db: &Database, job_id: &str) -> JobRow {
        job_repo::find_by_id(db, job_id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_completes_with_profile() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe\nSenior Rust engineer at Acme", "cv.txt");
        let pipeline = Pipeline::new(db.clone(), collaborators(&db), small_chunks());
        let recorder = Recorder::default();

        let (outcome, ctx) = pipeline.run(ctx, &recorder).await;

        assert_eq!(outcome, RunOutcome::Completed);
        let row = row(&db, &ctx.job_id);
        assert_eq!(row.status, "completed");
        assert_eq!(row.progress, 100);
        assert!(row.completed_at.is_some());

        let profile = profile_repo::find_by_job(&db, &ctx.job_id).unwrap().unwrap();
        assert_eq!(profile.data.summary, "Jane Doe");
        assert!(ctx.chunks.len() > 1);
        assert_eq!(
            crate::db::vector_repo::count(&db, &ctx.job_id).unwrap(),
            ctx.chunks.len() as u64
        );

        let values = recorder.values.lock().unwrap().clone();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
        assert_eq!(values.first(), Some(&10));
        assert!(values.contains(&55));
        assert!(values.contains(&60));
        assert_eq!(values.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_blank_document_fails_as_invalid() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"   \n\n  ", "blank.txt");
        let pipeline = Pipeline::new(db.clone(), collaborators(&db), small_chunks());

        let (outcome, ctx) = pipeline.run(ctx, &NoopProgress).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed { kind: FailureKind::InvalidDocument, .. }
        ));
        let row = row(&db, &ctx.job_id);
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_message.as_deref(), Some("No text extracted from document"));
        assert_eq!(row.progress, 30);
    }

    #[tokio::test]
    async fn test_malformed_profile_is_a_parse_failure() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe", "cv.txt");
        let collaborators = Collaborators {
            profile_extractor: Arc::new(MalformedProfile),
            ..collaborators(&db)
        };
        let pipeline = Pipeline::new(db.clone(), collaborators, small_chunks());

        let (_, ctx) = pipeline.run(ctx, &NoopProgress).await;

        let row = row(&db, &ctx.job_id);
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_kind.as_deref(), Some("parse"));
        assert!(!profile_repo::exists(&db, &ctx.job_id).unwrap());
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_internal_failure() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe", "cv.txt");
        let collaborators = Collaborators {
            extractor: Arc::new(PanickingExtractor),
            ..collaborators(&db)
        };
        let pipeline = Pipeline::new(db.clone(), collaborators, small_chunks());

        let (outcome, ctx) = pipeline.run(ctx, &NoopProgress).await;

        match outcome {
            RunOutcome::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::Internal);
                assert!(message.contains("extractor exploded"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(row(&db, &ctx.job_id).error_kind.as_deref(), Some("internal"));
    }

    #[tokio::test]
    async fn test_vector_store_failure_is_not_fatal() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe, platform engineer", "cv.txt");
        let collaborators = Collaborators {
            vector_store: Arc::new(FailingVectorStore),
            ..collaborators(&db)
        };
        let pipeline = Pipeline::new(db.clone(), collaborators, small_chunks());

        let (outcome, ctx) = pipeline.run(ctx, &NoopProgress).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            ctx.warnings,
            vec![PipelineWarning::VectorStoreFailed {
                error: "vector backend offline".to_string()
            }]
        );
        assert!(profile_repo::exists(&db, &ctx.job_id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedding_call_timeout() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe", "cv.txt");
        let collaborators = Collaborators {
            extractor: Arc::new(PlainExtractor),
            embedder: Arc::new(SlowEmbedder),
            ..collaborators(&db)
        };
        let config = Arc::new(PipelineConfig {
            embedding_call_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        });
        let pipeline = Pipeline::new(db.clone(), collaborators, config);

        let (outcome, ctx) = pipeline.run(ctx, &NoopProgress).await;

        match outcome {
            RunOutcome::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::ExternalService);
                assert_eq!(message, "Embedding call timed out after 5s");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(row(&db, &ctx.job_id).status, "failed");
    }

    #[tokio::test]
    async fn test_run_on_non_queued_job_is_lost() {
        let db = Database::open_in_memory().unwrap();
        let ctx = seed(&db, b"Jane Doe", "cv.txt");
        job_repo::mark_failed(&db, &ctx.job_id, "earlier", FailureKind::Parse, &timestamp())
            .unwrap();
        let pipeline = Pipeline::new(db.clone(), collaborators(&db), small_chunks());

        let (outcome, ctx) = pipeline.run(ctx, &NoopProgress).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed { kind: FailureKind::Internal, .. }
        ));
        // The earlier failure is left as it was.
        assert_eq!(row(&db, &ctx.job_id).error_message.as_deref(), Some("earlier"));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42u32), "unknown panic");
    }
}
