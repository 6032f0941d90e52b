// Embeddings module
// Provider contract, the OpenAI/Azure OpenAI client and the text splitter

pub mod openai;
pub mod splitter;

use async_trait::async_trait;

use crate::Result;

pub use openai::OpenAiClient;
pub use splitter::{ChunkingConfig, split_pages, split_text};

/// A vector returned by the provider along with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub prompt_tokens: i32,
    pub total_tokens: i32,
}

/// Converts free text into a fixed-length vector
///
/// Failures surface as `AnnError::Provider` and are not retried.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}
