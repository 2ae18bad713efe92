use chrono::{DateTime, Utc};
use serde::Serialize;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A document handed over by the ingest path, before it is stored.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner_id: String,
    pub filename: String,
    /// Explicit MIME type. When absent it is detected from `filename`.
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

impl NewUpload {
    pub fn new(owner_id: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            owner_id: owner_id.into(),
            filename: filename.into(),
            mime_type: None,
            content,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// A stored, immutable document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub upload_id: String,
    pub owner_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub mime_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    /// Assigns an id and resolves the MIME type for a new upload.
    pub fn from_new(new: NewUpload) -> Self {
        let mime_type = new
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .or_else(|| detect_mime_type(&new.filename))
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

        Self {
            upload_id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            filename: new.filename,
            size_bytes: new.content.len() as u64,
            mime_type,
            content: new.content,
            created_at: Utc::now(),
        }
    }
}

/// Detects MIME type from a filename using the mime_guess crate.
/// Returns `None` for unknown extensions.
fn detect_mime_type(filename: &str) -> Option<String> {
    mime_guess::from_path(filename).first().map(|m| m.to_string())
}
