//! Deterministic providers for unit tests

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::{Chunk, EmbeddingProvider};
use crate::llm::CompletionProvider;
use crate::{AgentError, Result};

/// Embeds text by hashing it; equal texts get equal vectors
pub(crate) struct StubEmbedder {
    pub dimension: usize,
    pub model: String,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "stub-embed".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AgentError::Embedding("stub embedder failure".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Returns a fixed answer and records every prompt it receives
pub(crate) struct StubCompleter {
    pub answer: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl StubCompleter {
    pub(crate) fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for StubCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
        self.answer.clone().map_err(AgentError::Completion)
    }
}

/// Replays scripted answers in order, then repeats the last one
pub(crate) struct ScriptedCompleter {
    answers: Vec<String>,
    next: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompleter {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| (*a).to_string()).collect(),
            next: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
        let position = self.next.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(position)
            .or_else(|| self.answers.last())
            .cloned()
            .ok_or_else(|| AgentError::Completion("no scripted answer".to_string()))
    }
}

pub(crate) fn chunk(page: usize, chunk_index: usize, text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        page,
        chunk_index,
    }
}
