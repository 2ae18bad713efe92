//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const CREATE_UPLOADS: &str = "
CREATE TABLE IF NOT EXISTS uploads (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    content BLOB NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_uploads_owner ON uploads(owner_id);
";

const CREATE_ANALYSIS_JOBS: &str = "
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    upload_id TEXT NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued' CHECK (status IN (
        'queued', 'extracting_text', 'chunking', 'generating_embeddings',
        'analyzing', 'completed', 'failed'
    )),
    progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
    current_step TEXT NOT NULL DEFAULT '',
    error_message TEXT,
    error_kind TEXT,
    attempt INTEGER NOT NULL DEFAULT 1,
    profile_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_analysis_jobs_owner ON analysis_jobs(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_analysis_jobs_status ON analysis_jobs(status);
CREATE INDEX IF NOT EXISTS idx_analysis_jobs_upload ON analysis_jobs(upload_id);
";

const CREATE_USER_PROFILES: &str = "
CREATE TABLE IF NOT EXISTS user_profiles (
    job_id TEXT PRIMARY KEY NOT NULL REFERENCES analysis_jobs(id) ON DELETE CASCADE,
    skills TEXT NOT NULL,
    experience TEXT NOT NULL,
    education TEXT NOT NULL,
    summary TEXT NOT NULL,
    recommendations TEXT NOT NULL,
    strengths TEXT NOT NULL,
    weaknesses TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

const CREATE_JOB_VECTORS: &str = "
CREATE TABLE IF NOT EXISTS job_vectors (
    job_id TEXT NOT NULL REFERENCES analysis_jobs(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    PRIMARY KEY (job_id, chunk_index)
);
";

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_uploads_table",
        sql: CREATE_UPLOADS,
    },
    Migration {
        version: 2,
        description: "create_analysis_jobs_table",
        sql: CREATE_ANALYSIS_JOBS,
    },
    Migration {
        version: 3,
        description: "create_user_profiles_table",
        sql: CREATE_USER_PROFILES,
    },
    Migration {
        version: 4,
        description: "create_job_vectors_table",
        sql: CREATE_JOB_VECTORS,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}
