//! # Knowledge index
//!
//! In-memory semantic search over a fixed set of pre-embedded knowledge
//! entries (biography, books, scraped sites). Entries are loaded lazily from
//! JSON files on first search and ranked by cosine similarity against a
//! query embedding.
//!
//! Retrieval is strictly best-effort: an unreadable file, an empty corpus,
//! or an embedding API failure all yield an empty result set, never an
//! error. Response generation must not depend on retrieval succeeding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use embedding::Embedder;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};

mod context;
mod types;

pub use context::format_context;
pub use types::{KnowledgeEntry, KnowledgeFile, SearchResult};

/// Knowledge files read from the data directory. events has biographical
/// data, blogs has book/archive content, websites has scraped site data.
const KNOWLEDGE_FILES: [&str; 3] = ["events.json", "blogs.json", "websites.json"];

/// Search parameters. Thresholds are heuristics, kept tunable rather than
/// baked into the index.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
        }
    }
}

/// Semantic index over the embedded knowledge base.
///
/// The entry set is loaded once, on first use; concurrent first callers
/// coalesce on the same load. The loaded corpus is immutable afterwards, so
/// searches share it without locking.
pub struct KnowledgeIndex {
    data_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    entries: OnceCell<Vec<KnowledgeEntry>>,
}

impl KnowledgeIndex {
    pub fn new(data_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            data_dir: data_dir.into(),
            embedder,
            entries: OnceCell::new(),
        }
    }

    /// Searches the knowledge base for entries relevant to `query`.
    ///
    /// Results carry scores >= `min_score`, sorted non-increasing (ties keep
    /// load order), at most `top_k` of them. Any failure along the way
    /// returns an empty vector.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn search(&self, query: &str, options: SearchOptions) -> Vec<SearchResult> {
        let entries = self.entries().await;
        if entries.is_empty() {
            warn!("knowledge base is empty");
            return Vec::new();
        }

        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to embed knowledge query");
                return Vec::new();
            }
        };

        let mut results: Vec<SearchResult> = entries
            .iter()
            .map(|entry| SearchResult {
                score: cosine_similarity(&query_embedding, &entry.embedding),
                entry: entry.clone(),
            })
            .filter(|r| r.score >= options.min_score)
            .collect();

        // Vec::sort_by is stable, so equal scores keep original load order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(options.top_k);
        results
    }

    /// Number of loaded entries. Loads on first call like `search`.
    pub async fn len(&self) -> usize {
        self.entries().await.len()
    }

    async fn entries(&self) -> &[KnowledgeEntry] {
        self.entries
            .get_or_init(|| async { load_entries(&self.data_dir) })
            .await
    }
}

/// Reads every knowledge file in `data_dir`, skipping unreadable files and
/// entries without embeddings. A missing file is logged and contributes
/// nothing; the load itself never fails.
fn load_entries(data_dir: &Path) -> Vec<KnowledgeEntry> {
    let mut entries = Vec::new();

    for file in KNOWLEDGE_FILES {
        let path = data_dir.join(file);
        let parsed: KnowledgeFile = match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|data| serde_json::from_str(&data).map_err(anyhow::Error::from))
        {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(file, error = %e, "failed to load knowledge file");
                continue;
            }
        };

        let before = parsed.entries.len();
        let valid: Vec<KnowledgeEntry> = parsed
            .entries
            .into_iter()
            .filter(|entry| !entry.embedding.is_empty())
            .collect();
        info!(
            file,
            entry_count = valid.len(),
            skipped = before - valid.len(),
            "loaded knowledge file"
        );
        entries.extend(valid);
    }

    info!(total_entries = entries.len(), "knowledge base loaded");
    entries
}

/// Cosine similarity of two vectors: dot product over the product of
/// magnitudes. Defined as 0 when the lengths differ or either magnitude is
/// zero.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot / magnitude
}
