
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::document::Document;

/// A contiguous window of one page, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Zero-based page the chunk was cut from
    pub page: usize,
    /// The index of this chunk within its page
    pub chunk_index: usize,
}

/// Configuration for character-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same page
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100_000).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(self.overlap, self.chunk_size));
        }

        Ok(())
    }

    /// Distance in characters between the starts of consecutive windows
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// Split every page of `document` into overlapping chunks, in page order
#[inline]
pub fn split_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = document
        .pages
        .iter()
        .flat_map(|page| split_page(&page.text, page.index, config))
        .collect();

    debug!(
        "Split {} pages of {} into {} chunks",
        document.pages.len(),
        document.path.display(),
        chunks.len()
    );

    chunks
}

/// Split one page into windows of at most `chunk_size` characters.
///
/// Windows start `stride()` characters apart and the last one ends exactly at
/// the end of the page. Blank pages produce nothing.
#[inline]
pub fn split_page(text: &str, page: usize, config: &ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let chunk_size = config.chunk_size.max(1);

    if chars.len() <= chunk_size {
        return vec![Chunk {
            text: text.to_string(),
            page,
            chunk_index: 0,
        }];
    }

    let stride = config.stride();
    let mut chunks = Vec::with_capacity(chars.len() / stride + 1);
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            page,
            chunk_index: chunks.len(),
        });

        if end == chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}
