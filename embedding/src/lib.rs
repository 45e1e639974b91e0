//! # Text embeddings
//!
//! Defines the [`Embedder`] interface used by the knowledge index to embed
//! incoming queries, and the OpenAI-backed implementation.

use async_trait::async_trait;

mod openai;

pub use openai::OpenAiEmbedder;

/// Service producing a fixed-length embedding vector for a text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, anyhow::Error>;
}
