//! Vector repository for `job_vectors`. Embeddings are stored as
//! little-endian `f32` blobs.

use rusqlite::{params, Connection};

use super::{Database, DatabaseError};
use crate::vector::ChunkVector;

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Replaces every stored vector of a job with `vectors`, atomically.
pub fn replace(db: &Database, job_id: &str, vectors: &[ChunkVector]) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        delete_in(tx, job_id)?;
        let mut stmt = tx.prepare(
            "INSERT INTO job_vectors (job_id, chunk_index, content, dimensions, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for vector in vectors {
            stmt.execute(params![
                job_id,
                vector.chunk_index as i64,
                vector.content,
                vector.embedding.len() as i64,
                encode(&vector.embedding),
            ])?;
        }
        Ok(())
    })
}

/// Loads the vectors of a job ordered by chunk index.
pub fn load(db: &Database, job_id: &str) -> Result<Vec<ChunkVector>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT chunk_index, content, embedding FROM job_vectors
             WHERE job_id = ?1 ORDER BY chunk_index",
        )?;
        let vectors = stmt
            .query_map(params![job_id], |r| {
                let index: i64 = r.get(0)?;
                let blob: Vec<u8> = r.get(2)?;
                Ok(ChunkVector {
                    chunk_index: index as usize,
                    content: r.get(1)?,
                    embedding: decode(&blob),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vectors)
    })
}

/// Counts the vectors stored for a job.
pub fn count(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM job_vectors WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes all vectors of a job. Returns the number of rows removed.
pub fn delete_in(conn: &Connection, job_id: &str) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM job_vectors WHERE job_id = ?1",
        params![job_id],
    )?)
}
