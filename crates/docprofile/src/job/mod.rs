mod status;
mod upload;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use status::{FailureKind, JobStatus};
pub use upload::{NewUpload, Upload};

use crate::db::job_repo::JobRow;
use crate::db::DatabaseError;

/// Point-in-time view of an analysis job, as returned by status reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub upload_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            column,
            value: value.to_string(),
        })
}

impl TryFrom<JobRow> for JobSnapshot {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status()?;
        let error_kind = match row.error_kind.as_deref() {
            Some(kind) => Some(FailureKind::parse(kind).ok_or_else(|| {
                DatabaseError::InvalidValue {
                    column: "error_kind",
                    value: kind.to_string(),
                }
            })?),
            None => None,
        };
        let completed_at = row
            .completed_at
            .as_deref()
            .map(|value| parse_timestamp("completed_at", value))
            .transpose()?;

        Ok(Self {
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            job_id: row.id,
            upload_id: row.upload_id,
            owner_id: row.owner_id,
            status,
            progress: row.progress,
            current_step: row.current_step,
            error_message: row.error_message,
            error_kind,
            attempt: row.attempt,
            completed_at,
        })
    }
}
