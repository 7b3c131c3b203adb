// LLM module
// Chat completion seam and the OpenAI-compatible client

pub mod openai;

use async_trait::async_trait;

use crate::Result;

pub use openai::ChatClient;

/// Turns a prompt into generated text
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
