//! Deterministic text windowing.
//!
//! Text is cut into windows of `chunk_size` characters (Unicode scalar
//! values, never bytes) where consecutive windows share `overlap`
//! characters. The same input and settings always produce the same chunks.

use serde::Serialize;

use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// One window of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Character offset of the first character, inclusive.
    pub start_char: usize,
    /// Character offset one past the last character.
    pub end_char: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Validation {
                message: "chunk size must be greater than 0".to_string(),
            });
        }
        if overlap >= chunk_size {
            return Err(ConfigError::Validation {
                message: format!(
                    "chunk overlap ({}) must be smaller than chunk size ({})",
                    overlap, chunk_size
                ),
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into overlapping windows. Blank input yields no chunks;
    /// text no longer than one window yields exactly one.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end of the string.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(total_chars);
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                start_char: start,
                end_char: end,
            });
            if end == total_chars {
                break;
            }
            start += step;
        }

        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}
