use thiserror::Error;

pub use index::IndexLoadError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document load error: {0}")]
    DocumentLoad(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index load error: {0}")]
    IndexLoad(#[from] IndexLoadError),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agents;
pub mod commands;
pub mod config;
pub mod doctors;
pub mod document;
pub mod embeddings;
pub mod http;
pub mod index;
pub mod llm;
pub mod mcp;
pub mod rag;

#[cfg(test)]
pub(crate) mod test_support;
