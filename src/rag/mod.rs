//! Retrieval-augmented question answering over the indexed policy document.


use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::document::load_document;
use crate::embeddings::{EmbeddingProvider, split_document};
use crate::index::snapshot::{self, file_sha256};
use crate::index::{IndexLoadError, SearchHit, VectorIndex};
use crate::llm::CompletionProvider;
use crate::{AgentError, Result};

/// Separator placed between retrieved chunks in the prompt context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Render the question-answering prompt
#[inline]
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an insurance policy expert. Answer the user's question \
         based only on the following context. Be precise and professional:\n\n\
         Context: {context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Retrieved chunks for one question
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub hits: Vec<SearchHit>,
    /// Chunk texts in hit order, joined with [`CONTEXT_SEPARATOR`]
    pub context: String,
}

pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    top_k: usize,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("chunks", &self.index.len())
            .field("dimension", &self.index.dimension())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Fails if the provider's dimension differs from the index's
    #[inline]
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        retrieval: &RetrievalConfig,
    ) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(AgentError::Config(format!(
                "embedding provider produces {}-dimensional vectors but the index holds {}",
                embedder.dimension(),
                index.dimension()
            )));
        }

        if retrieval.top_k == 0 {
            return Err(AgentError::Config("top_k must be at least 1".to_string()));
        }

        Ok(Self {
            index,
            embedder,
            completer,
            top_k: retrieval.top_k,
        })
    }

    /// Embed `question` and fetch the nearest chunks
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<QueryResult> {
        let query_vector = self.embedder.embed(question).await?;
        let hits = self.index.search(&query_vector, self.top_k)?;

        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        debug!(
            "Retrieved {} chunks ({} characters of context)",
            hits.len(),
            context.len()
        );

        Ok(QueryResult { hits, context })
    }

    /// Answer `question` from the retrieved context
    #[inline]
    pub async fn query(&self, question: &str) -> Result<String> {
        let retrieved = self.retrieve(question).await?;
        self.generate(question, &retrieved).await
    }

    /// Complete the prompt built from already retrieved context
    #[inline]
    pub async fn generate(&self, question: &str, retrieved: &QueryResult) -> Result<String> {
        let prompt = render_prompt(&retrieved.context, question);
        self.completer.complete(&prompt).await
    }

    /// Like [`query`](Self::query), reporting failures as answer text
    #[inline]
    pub async fn answer(&self, question: &str) -> String {
        match self.query(question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Policy query failed: {}", e);
                format!("Error processing request: {e}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Restored from the snapshot on disk
    Loaded,
    /// Built from the source document and persisted
    Built,
}

/// Load the persisted index, or build and persist it from the source document.
///
/// Any snapshot problem (missing, corrupt, wrong dimension, stale source)
/// falls back to a rebuild. Failures while rebuilding are returned.
#[inline]
pub async fn initialize_index(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    force_rebuild: bool,
) -> Result<(VectorIndex, IndexOrigin)> {
    let snapshot_path = config.snapshot_path();
    let document_path = config.document_path();

    if force_rebuild {
        info!("Rebuild requested, ignoring any existing snapshot");
    } else {
        let source_hash = if config.index.verify_source {
            match file_sha256(&document_path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(
                        "Cannot hash {} for staleness check: {}",
                        document_path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        match snapshot::load_verified(&snapshot_path, embedder.dimension(), source_hash.as_deref())
            .await
        {
            Ok(index) => return Ok((index, IndexOrigin::Loaded)),
            Err(IndexLoadError::NotFound(path)) => {
                info!("No snapshot at {}, building index", path.display());
            }
            Err(e) => {
                warn!("Discarding snapshot at {}: {}", snapshot_path.display(), e);
            }
        }
    }

    let document = load_document(&document_path)?;
    let chunks = split_document(&document, &config.chunking);
    info!(
        "Indexing {} chunks from {} pages of {}",
        chunks.len(),
        document.pages.len(),
        document_path.display()
    );

    let index = VectorIndex::build(chunks, embedder).await?;
    let source_hash = file_sha256(&document_path).ok();
    snapshot::persist(&index, &snapshot_path, source_hash).await?;

    Ok((index, IndexOrigin::Built))
}
