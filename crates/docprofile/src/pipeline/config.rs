use std::time::Duration;

use crate::chunker::TextChunker;
use crate::config::EngineConfig;
use crate::error::ConfigError;

pub struct PipelineConfig {
    pub chunker: TextChunker,
    pub extraction_timeout: Duration,
    pub embedding_call_timeout: Duration,
    pub embedding_deadline: Duration,
    pub vector_store_timeout: Duration,
    pub analysis_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            chunker: TextChunker::new(config.chunking.chunk_size, config.chunking.overlap)?,
            extraction_timeout: config.timeouts.extraction(),
            embedding_call_timeout: config.timeouts.embedding_call(),
            embedding_deadline: config.timeouts.embedding_deadline(),
            vector_store_timeout: config.timeouts.vector_store(),
            analysis_timeout: config.timeouts.analysis(),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let config = EngineConfig::default();
        let timeouts = &config.timeouts;
        Self {
            chunker: TextChunker::default(),
            extraction_timeout: timeouts.extraction(),
            embedding_call_timeout: timeouts.embedding_call(),
            embedding_deadline: timeouts.embedding_deadline(),
            vector_store_timeout: timeouts.vector_store(),
            analysis_timeout: timeouts.analysis(),
        }
    }
}
