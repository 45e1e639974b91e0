//! OpenAI implementation of [`Embedder`] over the embeddings API.

use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::Embedder;

/// Default embedding model; its output dimension must match the dimension of
/// the pre-embedded knowledge entries.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Queries longer than this are clipped before embedding; the tail of a chat
/// message past this point adds nothing to retrieval.
const MAX_QUERY_CHARS: usize = 8000;

const EMBED_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Embedding service backed by the OpenAI embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, None)
    }

    /// Points requests at an OpenAI-compatible endpoint when `base_url` is
    /// set (mock servers in tests, proxies in deployment).
    pub fn with_base_url(api_key: String, base_url: Option<&str>) -> Self {
        let mut config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url.filter(|u| !u.is_empty()) {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

fn clip_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, anyhow::Error> {
        let input = clip_to_chars(text, MAX_QUERY_CHARS);

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(vec![input])
            .build()?;

        let embeddings = self.client.embeddings();
        let create = embeddings.create(request);
        let response = match tokio::time::timeout(EMBED_TIMEOUT, create).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(error = %e, "embedding request failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout_secs = EMBED_TIMEOUT.as_secs(), "embedding request timed out");
                return Err(anyhow::anyhow!(
                    "embedding request timed out after {} seconds",
                    EMBED_TIMEOUT.as_secs()
                ));
            }
        };

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| anyhow::anyhow!("no embedding in response"))?;

        debug!(dimension = embedding.len(), "query embedded");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip_to_chars("hello", 10), "hello");
        assert_eq!(clip_to_chars("hello", 3), "hel");
        // Multi-byte characters are never split.
        assert_eq!(clip_to_chars("héllo", 2), "hé");
    }
}
