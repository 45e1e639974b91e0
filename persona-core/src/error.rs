use thiserror::Error;

/// Errors surfaced by the generation pipeline.
///
/// Retrieval failures never appear here: knowledge lookup is best-effort and
/// recovers locally to an empty context. Search-mode callers convert any of
/// these into the fixed fallback response one layer above the engine;
/// default-mode callers propagate them.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("OPENAI_API_KEY is required but missing")]
    MissingApiKey,

    #[error("no user prompt provided")]
    NoUserPrompt,

    #[error("no content returned from the model")]
    EmptyCompletion,

    #[error("web search returned no usable intel")]
    NoIntel,

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
