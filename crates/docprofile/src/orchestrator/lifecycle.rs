//! Retry and deletion of existing jobs.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use super::{validate_id, Orchestrator};
use crate::broadcast::JobProgressEvent;
use crate::db::job_repo::{self, JobRow};
use crate::db::{profile_repo, timestamp, upload_repo, vector_repo};
use crate::error::{EngineError, Result};
use crate::job::JobStatus;
use crate::pipeline::PipelineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemResult {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    pub job_id: String,
    pub result: BatchItemResult,
}

/// Result of [`Orchestrator::batch_delete`], one outcome per distinct id in
/// request order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteReport {
    pub deleted_count: usize,
    pub outcomes: Vec<BatchItemOutcome>,
}

impl Orchestrator {
    /// Re-queues a failed job under the same id.
    ///
    /// The previous attempt's profile and vectors are discarded and the
    /// attempt counter goes up by one. Refused for jobs that are not
    /// `failed`, that used up their retries, or whose previous execution
    /// has not let go of the id yet.
    pub fn retry(&self, job_id: &str) -> Result<()> {
        validate_id("job_id", job_id)?;
        self.ensure_accepting()?;

        let claim = self
            .inner
            .in_flight
            .claim(job_id)
            .map_err(|e| EngineError::invalid_state(job_id, e.to_string()))?;
        let max_retries = self.inner.config.max_retries;

        let row: JobRow = self.inner.db.with_transaction(|tx| {
            let row = job_repo::find_in(tx, job_id)?
                .ok_or_else(|| EngineError::job_not_found(job_id))?;

            let status = row.status()?;
            if status != JobStatus::Failed {
                return Err(EngineError::invalid_state(
                    job_id,
                    format!("only failed jobs can be retried, job is '{}'", status),
                ));
            }
            if row.attempt > max_retries {
                return Err(EngineError::invalid_state(
                    job_id,
                    format!("retry limit of {} reached", max_retries),
                ));
            }
            if !upload_repo::exists_in(tx, &row.upload_id)? {
                return Err(EngineError::upload_not_found(&row.upload_id));
            }

            profile_repo::delete_in(tx, job_id)?;
            vector_repo::delete_in(tx, job_id)?;
            if !job_repo::reset_for_retry(tx, job_id, &timestamp())? {
                return Err(EngineError::invalid_state(job_id, "job changed during retry"));
            }
            Ok(row)
        })?;

        let attempt = row.attempt + 1;
        info!(job_id, attempt, "Job re-queued");

        self.inner
            .broadcaster
            .send(JobProgressEvent::queued(job_id, "Queued for retry"));
        self.schedule(
            claim,
            PipelineContext::new(job_id, &row.upload_id, attempt, row.profile_url),
        );
        Ok(())
    }

    /// Deletes a terminal job with its profile and vectors.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        validate_id("job_id", job_id)?;

        self.inner.db.with_transaction(|tx| {
            let row = job_repo::find_in(tx, job_id)?
                .ok_or_else(|| EngineError::job_not_found(job_id))?;
            ensure_terminal(&row)?;
            purge(tx, job_id)
        })?;

        info!(job_id, "Deleted job");
        Ok(())
    }

    /// Deletes several terminal jobs at once.
    ///
    /// Either every existing job in the batch is deleted or none is: a
    /// single queued or running job rejects the whole request. Unknown ids
    /// are reported as `not_found` and do not count as deleted.
    pub fn batch_delete(&self, job_ids: &[String]) -> Result<BatchDeleteReport> {
        let limit = self.inner.config.max_batch_delete;
        if job_ids.is_empty() || job_ids.len() > limit {
            return Err(EngineError::Validation(format!(
                "batch must contain between 1 and {} job ids, got {}",
                limit,
                job_ids.len()
            )));
        }
        for id in job_ids {
            validate_id("job_id", id)?;
        }

        let mut seen = HashSet::new();
        let distinct: Vec<&str> = job_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let report = self.inner.db.with_transaction(|tx| {
            let mut outcomes = Vec::with_capacity(distinct.len());
            let mut found = Vec::new();

            for id in &distinct {
                match job_repo::find_in(tx, id)? {
                    Some(row) => {
                        ensure_terminal(&row)?;
                        found.push(*id);
                        outcomes.push(BatchItemOutcome {
                            job_id: id.to_string(),
                            result: BatchItemResult::Deleted,
                        });
                    }
                    None => outcomes.push(BatchItemOutcome {
                        job_id: id.to_string(),
                        result: BatchItemResult::NotFound,
                    }),
                }
            }

            for id in &found {
                purge(tx, id)?;
            }

            Ok::<_, EngineError>(BatchDeleteReport {
                deleted_count: found.len(),
                outcomes,
            })
        })?;

        info!(
            requested = job_ids.len(),
            deleted = report.deleted_count,
            "Batch delete finished"
        );
        Ok(report)
    }
}

fn ensure_terminal(row: &JobRow) -> Result<()> {
    let status = row.status()?;
    if !status.is_terminal() {
        return Err(EngineError::invalid_state(
            &row.id,
            format!("job is still '{}'", status),
        ));
    }
    Ok(())
}

fn purge(conn: &rusqlite::Connection, job_id: &str) -> Result<()> {
    profile_repo::delete_in(conn, job_id)?;
    vector_repo::delete_in(conn, job_id)?;
    job_repo::delete_in(conn, job_id)?;
    Ok(())
}
