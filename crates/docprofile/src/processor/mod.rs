pub mod docx;
pub mod pdf;
pub mod text;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExtractError;

/// Converts a stored document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, content: &[u8], mime_type: &str) -> Result<String, ExtractError>;
}

/// Document families the bundled processors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Resolves a MIME type, ignoring parameters such as `; charset=utf-8`.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match essence.as_str() {
            "text/plain" | "text/markdown" | "text/x-markdown" | "text/csv" => Some(Self::Text),
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            _ => None,
        }
    }
}

pub trait DocumentProcessor: Send + Sync {
    fn extract_text(&self, content: &[u8]) -> Result<String, ExtractError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        let processors: Vec<Box<dyn DocumentProcessor>> = vec![
            Box::new(text::TextProcessor::new()),
            Box::new(pdf::PdfProcessor::new()),
            Box::new(docx::DocxProcessor::new()),
        ];

        Self { processors }
    }

    pub fn process(&self, content: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        let format = DocumentFormat::from_mime_type(mime_type)
            .ok_or_else(|| ExtractError::UnsupportedFormat(mime_type.to_string()))?;

        for processor in &self.processors {
            if processor.supports(format) {
                return processor.extract_text(content);
            }
        }

        Err(ExtractError::UnsupportedFormat(mime_type.to_string()))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// [`TextExtractor`] backed by the bundled processors. Parsing runs on the
/// blocking thread pool.
#[derive(Clone, Default)]
pub struct DocumentExtractor {
    registry: Arc<ProcessorRegistry>,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, content: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        let registry = Arc::clone(&self.registry);
        let content = content.to_vec();
        let mime_type = mime_type.to_string();

        tokio::task::spawn_blocking(move || registry.process(&content, &mime_type))
            .await
            .map_err(|e| ExtractError::Internal(e.to_string()))?
    }
}
