use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// Hard ceiling for [`EngineConfig::max_batch_delete`].
pub const MAX_BATCH_DELETE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// SQLite file. Defaults to `~/.docprofile/data/docprofile.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Maximum number of pipeline executions running at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How many times a failed job may be retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_batch_delete")]
    pub max_batch_delete: usize,
    #[serde(default = "default_progress_capacity")]
    pub progress_channel_capacity: usize,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_pool_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_batch_delete() -> usize {
    MAX_BATCH_DELETE_LIMIT
}

fn default_progress_capacity() -> usize {
    256
}

impl EngineConfig {
    /// Resolved database location. `None` only when no home directory exists
    /// and no explicit path was configured.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            pool_size: default_pool_size(),
            max_retries: default_max_retries(),
            max_batch_delete: default_max_batch_delete(),
            progress_channel_capacity: default_progress_capacity(),
            chunking: ChunkingConfig::default(),
            timeouts: TimeoutConfig::default(),
            embedding: EmbeddingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Collaborator time limits, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_extraction_ms")]
    pub extraction_ms: u64,
    /// Limit for a single embedding call.
    #[serde(default = "default_embedding_call_ms")]
    pub embedding_call_ms: u64,
    /// Limit for the whole embedding stage.
    #[serde(default = "default_embedding_deadline_ms")]
    pub embedding_deadline_ms: u64,
    #[serde(default = "default_analysis_ms")]
    pub analysis_ms: u64,
    #[serde(default = "default_vector_store_ms")]
    pub vector_store_ms: u64,
}

fn default_extraction_ms() -> u64 {
    120_000
}

fn default_embedding_call_ms() -> u64 {
    60_000
}

fn default_embedding_deadline_ms() -> u64 {
    600_000
}

fn default_analysis_ms() -> u64 {
    180_000
}

fn default_vector_store_ms() -> u64 {
    60_000
}

impl TimeoutConfig {
    pub fn extraction(&self) -> Duration {
        Duration::from_millis(self.extraction_ms)
    }

    pub fn embedding_call(&self) -> Duration {
        Duration::from_millis(self.embedding_call_ms)
    }

    pub fn embedding_deadline(&self) -> Duration {
        Duration::from_millis(self.embedding_deadline_ms)
    }

    pub fn analysis(&self) -> Duration {
        Duration::from_millis(self.analysis_ms)
    }

    pub fn vector_store(&self) -> Duration {
        Duration::from_millis(self.vector_store_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extraction_ms: default_extraction_ms(),
            embedding_call_ms: default_embedding_call_ms(),
            embedding_deadline_ms: default_embedding_deadline_ms(),
            analysis_ms: default_analysis_ms(),
            vector_store_ms: default_vector_store_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector size of the bundled hashing embedder.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_dimensions() -> usize {
    crate::embedding::DEFAULT_DIMENSIONS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}
