//! The job orchestrator: entry point for submitting documents, polling
//! jobs and managing their lifecycle.
//!
//! Calls return as soon as the database reflects the request; pipeline
//! work happens in Tokio tasks bounded by a [`ConcurrencyLimiter`]. Every
//! execution holds an [`ExecutionClaim`] on its job id for as long as the
//! task lives, so a job never has two runs in flight.

mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::{validate_config, EngineConfig};
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{profile_repo, timestamp, upload_repo, Database};
use crate::error::{EngineError, Result};
use crate::job::{FailureKind, JobSnapshot, JobStatus, NewUpload, Upload};
use crate::pipeline::{BroadcastProgress, Pipeline, PipelineConfig, PipelineContext, RunOutcome};
use crate::profile::UserProfile;
use crate::worker::{ConcurrencyLimiter, ExecutionClaim, InFlightRegistry};

pub use crate::pipeline::Collaborators;
pub use lifecycle::{BatchDeleteReport, BatchItemOutcome, BatchItemResult};

const INTERRUPTED_MESSAGE: &str = "interrupted before completion";
const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

/// Optional inputs of a submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Public profile (e.g. a professional network page) handed to the
    /// profile extractor next to the document text.
    pub external_profile_url: Option<String>,
}

/// Filter for [`Orchestrator::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<JobSnapshot>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

struct Inner {
    db: Database,
    config: EngineConfig,
    pipeline: Pipeline,
    limiter: ConcurrencyLimiter,
    in_flight: InFlightRegistry,
    broadcaster: JobProgressBroadcaster,
    runtime: Handle,
}

/// Cloneable handle to one orchestrator instance.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator on the current Tokio runtime.
    pub fn new(db: Database, config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| EngineError::Runtime(e.to_string()))?;
        Self::with_runtime(db, config, collaborators, runtime)
    }

    /// Creates an orchestrator that spawns its pipeline tasks on `runtime`.
    pub fn with_runtime(
        db: Database,
        config: EngineConfig,
        collaborators: Collaborators,
        runtime: Handle,
    ) -> Result<Self> {
        validate_config(&config)?;
        let pipeline_config = Arc::new(PipelineConfig::from_config(&config)?);

        info!(
            pool_size = config.pool_size,
            max_retries = config.max_retries,
            "Orchestrator started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                pipeline: Pipeline::new(db.clone(), collaborators, pipeline_config),
                limiter: ConcurrencyLimiter::new(config.pool_size),
                in_flight: InFlightRegistry::new(),
                broadcaster: JobProgressBroadcaster::new(config.progress_channel_capacity),
                db,
                config,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.inner.limiter
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.inner.in_flight
    }

    /// Subscribes to progress events of every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.inner.broadcaster.subscribe()
    }

    /// Stores a document for later submission.
    pub fn store_upload(&self, upload: NewUpload) -> Result<Upload> {
        require_non_blank("owner_id", &upload.owner_id)?;
        require_non_blank("filename", &upload.filename)?;
        if upload.content.is_empty() {
            return Err(EngineError::Validation("document is empty".to_string()));
        }

        let upload = Upload::from_new(upload);
        upload_repo::insert(&self.inner.db, &upload)?;
        info!(
            upload_id = %upload.upload_id,
            mime_type = %upload.mime_type,
            size_bytes = upload.size_bytes,
            "Stored upload"
        );
        Ok(upload)
    }

    /// Deletes a document together with all of its finished jobs.
    ///
    /// Refused while any job of the upload is still queued or running.
    pub fn delete_upload(&self, upload_id: &str, owner_id: &str) -> Result<()> {
        validate_id("upload_id", upload_id)?;
        require_non_blank("owner_id", owner_id)?;

        self.inner.db.with_transaction(|tx| {
            let owner = upload_repo::find_owner_in(tx, upload_id)?;
            if owner.as_deref() != Some(owner_id) {
                return Err(EngineError::upload_not_found(upload_id));
            }

            let unfinished = job_repo::count_unfinished_for_upload(tx, upload_id)?;
            if unfinished > 0 {
                return Err(EngineError::InvalidState {
                    job_id: upload_id.to_string(),
                    reason: format!("upload still has {} unfinished job(s)", unfinished),
                });
            }

            upload_repo::delete_in(tx, upload_id)?;
            Ok(())
        })?;

        info!(upload_id, "Deleted upload");
        Ok(())
    }

    /// Creates a queued job for a stored upload and schedules it.
    pub fn submit(&self, upload_id: &str, owner_id: &str) -> Result<String> {
        self.submit_with(upload_id, owner_id, SubmitOptions::default())
    }

    pub fn submit_with(
        &self,
        upload_id: &str,
        owner_id: &str,
        options: SubmitOptions,
    ) -> Result<String> {
        validate_id("upload_id", upload_id)?;
        require_non_blank("owner_id", owner_id)?;
        let profile_url = match options.external_profile_url {
            Some(url) => {
                let url = url.trim().to_string();
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(EngineError::Validation(format!(
                        "external profile URL '{}' must be an http(s) URL",
                        url
                    )));
                }
                Some(url)
            }
            None => None,
        };
        self.ensure_accepting()?;

        // Uploads of other owners are indistinguishable from missing ones.
        match upload_repo::find_owner(&self.inner.db, upload_id)? {
            Some(owner) if owner == owner_id => {}
            _ => return Err(EngineError::upload_not_found(upload_id)),
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let claim = self
            .inner
            .in_flight
            .claim(&job_id)
            .map_err(|e| EngineError::invalid_state(&job_id, e.to_string()))?;

        let row = JobRow::queued(
            &job_id,
            upload_id,
            owner_id,
            profile_url.as_deref(),
            &timestamp(),
        );
        job_repo::insert(&self.inner.db, &row)?;
        info!(job_id = %job_id, upload_id, "Job submitted");

        self.inner
            .broadcaster
            .send(JobProgressEvent::queued(&job_id, &row.current_step));
        self.schedule(
            claim,
            PipelineContext::new(&job_id, upload_id, row.attempt, profile_url),
        );

        Ok(job_id)
    }

    /// Current state of a job.
    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        validate_id("job_id", job_id)?;
        let row = job_repo::find_by_id(&self.inner.db, job_id)?
            .ok_or_else(|| EngineError::job_not_found(job_id))?;
        Ok(JobSnapshot::try_from(row)?)
    }

    /// The profile produced by a completed job.
    pub fn result(&self, job_id: &str) -> Result<UserProfile> {
        let snapshot = self.status(job_id)?;
        if snapshot.status != JobStatus::Completed {
            return Err(EngineError::NotReady(job_id.to_string()));
        }

        profile_repo::find_by_job(&self.inner.db, job_id)?.ok_or_else(|| EngineError::NotFound {
            entity: "Profile",
            id: job_id.to_string(),
        })
    }

    /// Jobs of one owner, newest first.
    pub fn list_jobs(&self, owner_id: &str, query: JobQuery) -> Result<JobPage> {
        require_non_blank("owner_id", owner_id)?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, limit
            )));
        }
        let offset = query.offset.unwrap_or(0);

        let filter = JobFilter {
            owner_id: Some(owner_id.to_string()),
            status: query.status.map(|s| s.as_str().to_string()),
            limit: Some(limit),
            offset: Some(offset),
        };
        let (rows, total) = job_repo::query(&self.inner.db, &filter)?;
        let jobs = rows
            .into_iter()
            .map(JobSnapshot::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(JobPage {
            jobs,
            total,
            limit,
            offset,
        })
    }

    /// Fails every job a previous process left unfinished so it can be
    /// retried. Jobs with a live execution in this process are skipped.
    ///
    /// Returns the ids of the jobs that were marked failed.
    pub fn recover_interrupted(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();

        for job_id in job_repo::find_unfinished_ids(&self.inner.db)? {
            if self.inner.in_flight.contains(&job_id) {
                continue;
            }
            let now = timestamp();
            if job_repo::mark_failed(
                &self.inner.db,
                &job_id,
                INTERRUPTED_MESSAGE,
                FailureKind::Internal,
                &now,
            )? {
                self.inner.broadcaster.send(JobProgressEvent::failed(
                    &job_id,
                    0,
                    INTERRUPTED_MESSAGE,
                    FailureKind::Internal,
                ));
                recovered.push(job_id);
            }
        }

        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Marked interrupted jobs as failed");
        }
        Ok(recovered)
    }

    /// Waits until the job reaches a terminal state and its execution has
    /// exited, or until `limit` elapses. Returns the latest snapshot either
    /// way.
    pub async fn wait_for_terminal(&self, job_id: &str, limit: Duration) -> Result<JobSnapshot> {
        let mut events = self.subscribe();

        let waited = tokio::time::timeout(limit, async {
            loop {
                let snapshot = self.status(job_id)?;
                if snapshot.is_terminal() {
                    // The execution releases its claim right after the
                    // terminal write.
                    while self.inner.in_flight.contains(job_id) {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    return Ok::<_, EngineError>(snapshot);
                }
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(snapshot),
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => self.status(job_id),
        }
    }

    /// Stops scheduling new work and waits up to `grace` for running
    /// executions to finish. Jobs still waiting for a slot are failed.
    ///
    /// Returns `true` when nothing was left in flight.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!("Shutting down orchestrator...");
        self.inner.limiter.close();

        let deadline = tokio::time::Instant::now() + grace;
        while !self.inner.in_flight.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.inner.in_flight.len(),
                    "Shutdown grace period elapsed with executions still running"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        info!("All executions have stopped");
        true
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.inner.limiter.is_closed() {
            return Err(EngineError::Runtime(
                "orchestrator is shutting down".to_string(),
            ));
        }
        Ok(())
    }

    /// Spawns the background execution of a queued job. The claim travels
    /// with the task and is released when it exits.
    fn schedule(&self, claim: ExecutionClaim, ctx: PipelineContext) {
        let inner = Arc::clone(&self.inner);

        self.inner.runtime.spawn(async move {
            let _claim = claim;

            let slot = match inner.limiter.acquire().await {
                Ok(slot) => slot,
                Err(e) => {
                    let message = e.to_string();
                    warn!(job_id = %ctx.job_id, "Job not started: {}", message);
                    match job_repo::mark_failed(
                        &inner.db,
                        &ctx.job_id,
                        &message,
                        FailureKind::Internal,
                        &timestamp(),
                    ) {
                        Ok(true) => inner.broadcaster.send(JobProgressEvent::failed(
                            &ctx.job_id,
                            0,
                            &message,
                            FailureKind::Internal,
                        )),
                        Ok(false) => {}
                        Err(e) => warn!(job_id = %ctx.job_id, "Failed to record job failure: {}", e),
                    }
                    return;
                }
            };

            let job_id = ctx.job_id.clone();
            let progress = BroadcastProgress::new(&job_id, inner.broadcaster.sender());
            let (outcome, _ctx) = inner.pipeline.run(ctx, &progress).await;
            drop(slot);

            match outcome {
                RunOutcome::Completed => debug!(job_id = %job_id, "Execution finished"),
                RunOutcome::Failed { kind, .. } => {
                    debug!(job_id = %job_id, kind = %kind, "Execution finished with failure")
                }
            }
        });
    }
}

fn validate_id(field: &str, id: &str) -> Result<()> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| EngineError::Validation(format!("{} '{}' is not a valid UUID", field, id)))
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("job_id", "6f1c2a8e-3b0f-4d6e-9a51-0c8b9f6f2d11").is_ok());
        let err = validate_id("job_id", "job-1").unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("job_id")));
        assert!(validate_id("job_id", "").is_err());
    }

    #[test]
    fn test_require_non_blank() {
        assert!(require_non_blank("owner_id", "alice").is_ok());
        assert!(require_non_blank("owner_id", "  ").is_err());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let collaborators = Collaborators {
            extractor: Arc::new(crate::processor::DocumentExtractor::new()),
            embedder: Arc::new(crate::embedding::HashingEmbedder::default()),
            vector_store: Arc::new(crate::vector::SqliteVectorStore::new(
                Database::open_in_memory().unwrap(),
            )),
            profile_extractor: Arc::new(NeverCalled),
        };
        let result = Orchestrator::new(
            Database::open_in_memory().unwrap(),
            EngineConfig::default(),
            collaborators,
        );
        assert!(matches!(result, Err(EngineError::Runtime(_))));
    }

    struct NeverCalled;

    #[async_trait::async_trait]
    impl crate::profile::ProfileExtractor for NeverCalled {
        async fn analyze(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> std::result::Result<crate::profile::ProfileData, crate::error::AnalyzeError> {
            unreachable!("not used")
        }
    }
}
