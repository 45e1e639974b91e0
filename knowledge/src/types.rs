use serde::Deserialize;

/// One pre-embedded knowledge entry. Immutable after load; entries without a
/// non-empty embedding vector are discarded by the loader.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    pub id: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub date: Option<String>,
    pub source: String,
    pub source_type: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Situational note appended to the content when formatting context.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// On-disk shape of a knowledge file produced by the offline ingestion
/// pipeline.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    pub version: String,
    pub last_updated: String,
    pub entries: Vec<KnowledgeEntry>,
}

/// A ranked match: cosine similarity of the query embedding against the
/// entry embedding, in [-1, 1].
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entry: KnowledgeEntry,
    pub score: f32,
}
