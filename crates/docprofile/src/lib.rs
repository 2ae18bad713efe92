pub mod broadcast;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod processor;
pub mod profile;
pub mod telemetry;
pub mod vector;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use chunker::{Chunk, TextChunker};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use db::Database;
pub use embedding::{EmbeddingGenerator, HashingEmbedder};
pub use error::{
    AnalyzeError, ConfigError, EngineError, ExtractError, Result, ServiceError, TelemetryError,
    WorkerError,
};
pub use job::{FailureKind, JobSnapshot, JobStatus, NewUpload, Upload};
pub use orchestrator::{
    BatchDeleteReport, BatchItemOutcome, BatchItemResult, Collaborators, JobPage, JobQuery,
    Orchestrator, SubmitOptions,
};
pub use pipeline::{PipelineConfig, RunOutcome};
pub use processor::{DocumentExtractor, TextExtractor};
pub use profile::{parse_profile_response, ProfileData, ProfileExtractor, UserProfile};
pub use vector::{ChunkVector, SqliteVectorStore, VectorStore};
pub use worker::{ConcurrencyLimiter, InFlightRegistry};
