//! Job repository: CRUD and guarded state changes for `analysis_jobs`.
//!
//! Every mutating statement carries the expected current status in its
//! `WHERE` clause, so a row can never move backwards or leave a terminal
//! state regardless of what the caller believes. Functions taking a
//! `&Connection` are meant to be composed inside
//! [`Database::with_transaction`].

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::{FailureKind, JobStatus};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub upload_id: String,
    pub owner_id: String,
    pub status: String,
    pub progress: u8,
    pub current_step: String,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub attempt: u32,
    pub profile_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            upload_id: row.get("upload_id")?,
            owner_id: row.get("owner_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            current_step: row.get("current_step")?,
            error_message: row.get("error_message")?,
            error_kind: row.get("error_kind")?,
            attempt: row.get("attempt")?,
            profile_url: row.get("profile_url")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    /// A fresh `queued` row for a new submission.
    pub fn queued(
        id: &str,
        upload_id: &str,
        owner_id: &str,
        profile_url: Option<&str>,
        now: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            upload_id: upload_id.to_string(),
            owner_id: owner_id.to_string(),
            status: JobStatus::Queued.as_str().to_string(),
            progress: 0,
            current_step: "Queued".to_string(),
            error_message: None,
            error_kind: None,
            attempt: 1,
            profile_url: profile_url.map(str::to_string),
            created_at: now.to_string(),
            updated_at: now.to_string(),
            completed_at: None,
        }
    }

    /// Parses the stored status.
    pub fn status(&self) -> Result<JobStatus, DatabaseError> {
        JobStatus::parse(&self.status).ok_or_else(|| DatabaseError::InvalidValue {
            column: "status",
            value: self.status.clone(),
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO analysis_jobs (id, upload_id, owner_id, status, progress, current_step,
             error_message, error_kind, attempt, profile_url, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.upload_id,
                job.owner_id,
                job.status,
                job.progress,
                job.current_step,
                job.error_message,
                job.error_kind,
                job.attempt,
                job.profile_url,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Finds a job by its ID on an already locked connection or transaction.
pub fn find_in(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM analysis_jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Queries jobs with filters, returning (rows, total_count), newest first.
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push(format!("owner_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(owner_id.clone()));
        }
        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM analysis_jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM analysis_jobs {} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// IDs of every job that has not reached a terminal state.
pub fn find_unfinished_ids(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM analysis_jobs WHERE status NOT IN ('completed', 'failed')
             ORDER BY created_at",
        )?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Counts non-terminal jobs that reference the given upload.
pub fn count_unfinished_for_upload(
    conn: &Connection,
    upload_id: &str,
) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM analysis_jobs
         WHERE upload_id = ?1 AND status NOT IN ('completed', 'failed')",
        params![upload_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Moves a job from `from` to `to`, writing the stage's entry progress and
/// step label.
///
/// Returns `false` when the row is no longer in `from` (or is gone).
pub fn advance(
    db: &Database,
    id: &str,
    from: JobStatus,
    to: JobStatus,
    current_step: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) || to.is_terminal() {
        return Err(DatabaseError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE analysis_jobs
             SET status = ?3, progress = MAX(progress, ?4), current_step = ?5, updated_at = ?6
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                from.as_str(),
                to.as_str(),
                to.entry_progress(),
                current_step,
                now
            ],
        )?;
        Ok(updated == 1)
    })
}

/// Records intra-stage progress without changing the status.
///
/// Progress never decreases: a lower value than the stored one leaves the
/// row untouched and returns `false`.
pub fn record_progress(
    db: &Database,
    id: &str,
    status: JobStatus,
    progress: u8,
    current_step: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE analysis_jobs SET progress = ?3, current_step = ?4, updated_at = ?5
             WHERE id = ?1 AND status = ?2 AND progress <= ?3",
            params![id, status.as_str(), progress.min(99), current_step, now],
        )?;
        Ok(updated == 1)
    })
}

/// Marks a running job as failed. Terminal rows are left untouched.
pub fn mark_failed(
    db: &Database,
    id: &str,
    message: &str,
    kind: FailureKind,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE analysis_jobs
             SET status = 'failed', error_message = ?2, error_kind = ?3,
                 current_step = 'Failed', updated_at = ?4, completed_at = ?4
             WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            params![id, message, kind.as_str(), now],
        )?;
        Ok(updated == 1)
    })
}

/// Marks an `analyzing` job as completed. Intended to run in the same
/// transaction that inserts the profile.
pub fn mark_completed(conn: &Connection, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE analysis_jobs
         SET status = 'completed', progress = 100, current_step = 'Completed',
             error_message = NULL, error_kind = NULL, updated_at = ?2, completed_at = ?2
         WHERE id = ?1 AND status = 'analyzing'",
        params![id, now],
    )?;
    Ok(updated == 1)
}

/// Resets a failed job to `queued` and bumps its attempt counter.
pub fn reset_for_retry(conn: &Connection, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE analysis_jobs
         SET status = 'queued', progress = 0, current_step = 'Queued for retry',
             error_message = NULL, error_kind = NULL, completed_at = NULL,
             attempt = attempt + 1, updated_at = ?2
         WHERE id = ?1 AND status = 'failed'",
        params![id, now],
    )?;
    Ok(updated == 1)
}

/// Deletes a job row. Returns the number of rows removed.
pub fn delete_in(conn: &Connection, id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM analysis_jobs WHERE id = ?1", params![id])?)
}
