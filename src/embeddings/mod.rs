// Embeddings module
// Text chunking and the embedding provider seam

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::{AgentError, Result};

pub use chunking::{Chunk, ChunkingConfig, split_document, split_page};
pub use ollama::OllamaClient;

/// Maps text to fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name of the embedding model, recorded in snapshots
    fn model(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Embed many texts, returning one vector per input in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Embedding("provider returned no embedding".to_string()))
    }
}
