//! Profile repository for `user_profiles`. List-valued fields are stored
//! as JSON text columns.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::profile::{ProfileData, UserProfile};

struct ProfileRow {
    job_id: String,
    skills: String,
    experience: String,
    education: String,
    summary: String,
    recommendations: String,
    strengths: String,
    weaknesses: String,
    created_at: String,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            skills: row.get("skills")?,
            experience: row.get("experience")?,
            education: row.get("education")?,
            summary: row.get("summary")?,
            recommendations: row.get("recommendations")?,
            strengths: row.get("strengths")?,
            weaknesses: row.get("weaknesses")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_profile(self) -> Result<UserProfile, DatabaseError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DatabaseError::InvalidValue {
                column: "created_at",
                value: self.created_at.clone(),
            })?;

        Ok(UserProfile {
            job_id: self.job_id,
            data: ProfileData {
                skills: serde_json::from_str(&self.skills)?,
                experience: serde_json::from_str(&self.experience)?,
                education: serde_json::from_str(&self.education)?,
                summary: self.summary,
                recommendations: serde_json::from_str(&self.recommendations)?,
                strengths: serde_json::from_str(&self.strengths)?,
                weaknesses: serde_json::from_str(&self.weaknesses)?,
            },
            created_at,
        })
    }
}

/// Inserts a profile. Meant to share a transaction with
/// [`super::job_repo::mark_completed`].
pub fn insert_in(conn: &Connection, profile: &UserProfile) -> Result<(), DatabaseError> {
    let data = &profile.data;
    conn.execute(
        "INSERT INTO user_profiles (job_id, skills, experience, education, summary,
         recommendations, strengths, weaknesses, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            profile.job_id,
            serde_json::to_string(&data.skills)?,
            serde_json::to_string(&data.experience)?,
            serde_json::to_string(&data.education)?,
            data.summary,
            serde_json::to_string(&data.recommendations)?,
            serde_json::to_string(&data.strengths)?,
            serde_json::to_string(&data.weaknesses)?,
            profile.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Finds the profile of a job.
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM user_profiles WHERE job_id = ?1",
                params![job_id],
                ProfileRow::from_row,
            )
            .optional()?;
        row.map(ProfileRow::into_profile).transpose()
    })
}

/// Whether a profile exists for the job.
pub fn exists(db: &Database, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM user_profiles WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Deletes the profile of a job, if any. Returns the number of rows removed.
pub fn delete_in(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM user_profiles WHERE job_id = ?1",
        params![job_id],
    )?)
}
