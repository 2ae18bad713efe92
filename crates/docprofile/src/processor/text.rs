use crate::error::ExtractError;
use crate::processor::{DocumentFormat, DocumentProcessor};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for TextProcessor {
    fn extract_text(&self, content: &[u8]) -> Result<String, ExtractError> {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);

        match std::str::from_utf8(content) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => {
                tracing::warn!("Document is not valid UTF-8 ({}), decoding lossily", e);
                Ok(String::from_utf8_lossy(content).into_owned())
            }
        }
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }
}
