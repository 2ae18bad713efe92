use crate::chunker::Chunk;
use crate::vector::ChunkVector;

use super::error::PipelineWarning;

pub struct PipelineContext {
    // Input
    pub job_id: String,
    pub upload_id: String,
    pub attempt: u32,
    pub profile_url: Option<String>,

    // Text extraction result, guaranteed Some after extract_text
    pub text: Option<String>,

    // Chunking result
    pub chunks: Vec<Chunk>,

    // Embedding result, one vector per chunk in chunk order
    pub vectors: Vec<ChunkVector>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job_id: &str, upload_id: &str, attempt: u32, profile_url: Option<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            upload_id: upload_id.to_string(),
            attempt,
            profile_url,
            text: None,
            chunks: Vec::new(),
            vectors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
