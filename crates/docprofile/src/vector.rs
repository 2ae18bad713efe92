use async_trait::async_trait;
use serde::Serialize;

use crate::db::{vector_repo, Database};
use crate::error::ServiceError;

/// The embedding of one chunk, ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkVector {
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Persists chunk vectors for later similarity search.
///
/// Storage is best-effort from the pipeline's point of view: an error is
/// logged and the job carries on.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn store(&self, job_id: &str, vectors: &[ChunkVector]) -> Result<(), ServiceError>;
}

/// [`VectorStore`] writing into the `job_vectors` table. Vectors of a job
/// are replaced as a whole, so re-running a job never leaves stale chunks.
#[derive(Clone)]
pub struct SqliteVectorStore {
    db: Database,
}

impl SqliteVectorStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn store(&self, job_id: &str, vectors: &[ChunkVector]) -> Result<(), ServiceError> {
        vector_repo::replace(&self.db, job_id, vectors)
            .map_err(|e| ServiceError::new(format!("failed to store vectors: {}", e)))
    }
}
