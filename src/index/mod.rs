//! Exact nearest-neighbour index over embedded chunks.
//!
//! The index is built once from a document's chunks (or restored from a
//! snapshot, see [`snapshot`]) and is read-only afterwards, so `search` takes
//! `&self` and can be shared across request handlers behind an `Arc`.

#[cfg(test)]
mod tests;

pub mod snapshot;

use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::embeddings::{Chunk, EmbeddingProvider};
use crate::{AgentError, Result};

/// Chunks sent to the provider per progress tick
const BUILD_BATCH_SIZE: usize = 32;

/// Why a persisted snapshot could not be used
#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("no snapshot found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error("snapshot dimension {found} does not match embedding dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot was built from a different source document")]
    StaleSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    chunks: Vec<Chunk>,
    /// Row-major, `chunks.len() * dimension` values
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Embed `chunks` with `provider` and index them in order.
    ///
    /// Chunks with the same page and text are indexed once. Nothing is
    /// written to disk.
    #[inline]
    pub async fn build(chunks: Vec<Chunk>, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let total = chunks.len();
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .unique_by(|c| (c.page, c.text.clone()))
            .collect();

        if chunks.is_empty() {
            return Err(AgentError::IndexBuild("no chunks to index".to_string()));
        }

        if chunks.len() < total {
            debug!("Dropped {} duplicate chunks", total - chunks.len());
        }

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks {wide_bar}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(BUILD_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider.embed_batch(&texts).await?;

            if embedded.len() != texts.len() {
                bar.abandon();
                return Err(AgentError::IndexBuild(format!(
                    "provider returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                )));
            }

            bar.inc(texts.len() as u64);
            vectors.extend(embedded);
        }
        bar.finish_and_clear();

        let expected = provider.dimension();
        if let Some(found) = vectors.iter().map(Vec::len).find(|len| *len != expected) {
            return Err(AgentError::IndexBuild(format!(
                "provider returned a {found}-dimensional vector, expected {expected}"
            )));
        }

        let index = Self::from_parts(provider.model(), chunks, vectors)
            .map_err(AgentError::IndexBuild)?;

        info!(
            "Built index of {} chunks ({} dimensions, model {})",
            index.len(),
            index.dimension,
            index.model
        );

        Ok(index)
    }

    /// Assemble an index from already-embedded chunks
    #[inline]
    pub fn from_parts(
        model: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> std::result::Result<Self, String> {
        if chunks.len() != vectors.len() {
            return Err(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            ));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err("vectors must be non-empty".to_string());
        }

        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(format!(
                    "vector {} has {} dimensions, expected {}",
                    position,
                    vector.len(),
                    dimension
                ));
            }
            flat.extend_from_slice(vector);
        }

        Ok(Self {
            model: model.to_string(),
            dimension,
            chunks,
            vectors: flat,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Vector stored at `position`, in insertion order
    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Iterate `(chunk, vector)` pairs in insertion order
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = (&Chunk, &[f32])> {
        self.chunks
            .iter()
            .zip(self.vectors.chunks_exact(self.dimension))
    }

    /// The `k` nearest chunks to `query` by squared Euclidean distance.
    ///
    /// Results are ordered by increasing distance; equal distances keep
    /// insertion order. Asking for more than `len()` returns everything.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(AgentError::Other(anyhow::anyhow!(
                "search requires k >= 1"
            )));
        }

        if query.len() != self.dimension {
            return Err(AgentError::Embedding(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|vector| squared_l2(query, vector))
            .enumerate()
            .collect();

        // Stable: ties stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, distance)| SearchHit {
                chunk: self.chunks[position].clone(),
                distance,
            })
            .collect())
    }

    /// SHA-256 over every row, in order
    #[inline]
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update((self.dimension as u64).to_le_bytes());

        for (position, (chunk, vector)) in self.entries().enumerate() {
            hasher.update((position as u64).to_le_bytes());
            hasher.update((chunk.page as u64).to_le_bytes());
            hasher.update((chunk.chunk_index as u64).to_le_bytes());
            hasher.update((chunk.text.len() as u64).to_le_bytes());
            hasher.update(chunk.text.as_bytes());
            for value in vector {
                hasher.update(value.to_le_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
