use std::path::Path;

use crate::config::schema::{EngineConfig, MAX_BATCH_DELETE_LIMIT};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: EngineConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express. Also applied to configs
/// built in code before an orchestrator is created.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.pool_size == 0 {
        return Err(ConfigError::Validation {
            message: "pool_size must be at least 1".to_string(),
        });
    }

    if config.max_batch_delete == 0 || config.max_batch_delete > MAX_BATCH_DELETE_LIMIT {
        return Err(ConfigError::Validation {
            message: format!(
                "max_batch_delete must be between 1 and {}, got {}",
                MAX_BATCH_DELETE_LIMIT, config.max_batch_delete
            ),
        });
    }

    if config.progress_channel_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "progress_channel_capacity must be at least 1".to_string(),
        });
    }

    crate::chunker::TextChunker::new(config.chunking.chunk_size, config.chunking.overlap)?;

    if config.embedding.dimensions == 0 {
        return Err(ConfigError::Validation {
            message: "embedding.dimensions must be at least 1".to_string(),
        });
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("extraction_ms", timeouts.extraction_ms),
        ("embedding_call_ms", timeouts.embedding_call_ms),
        ("embedding_deadline_ms", timeouts.embedding_deadline_ms),
        ("analysis_ms", timeouts.analysis_ms),
        ("vector_store_ms", timeouts.vector_store_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("timeouts.{} must be greater than 0", name),
            });
        }
    }

    Ok(())
}
