//! Search-mode failure boundary.
//!
//! Any failure under search mode (the intel sub-call, the no-data sentinel,
//! or the synthesis pass) is converted here into a fixed fallback response.
//! The `usedFallback` flag marks it non-cacheable: a fallback is not a
//! reusable answer. Default-mode failures never pass through here and
//! propagate to the caller.

use persona_core::{PersonaMessage, PersonaResponse, ResponseMeta};
use tracing::error;

use crate::{GenerateOptions, PersonaEngine};

/// Fixed reply when search-backed generation fails.
pub const SEARCH_FALLBACK_TEXT: &str =
    "My web recon scraped a dead end. Give me a moment and try again, or tighten the query.";

/// Runs search-mode generation, substituting the fallback response on any
/// failure. Never returns an error.
pub async fn search_backed_response(
    engine: &PersonaEngine,
    messages: &[PersonaMessage],
    options: GenerateOptions,
) -> PersonaResponse {
    let options = GenerateOptions {
        enable_search: true,
        ..options
    };

    match engine.generate(messages, options).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "search-backed persona response failed");
            PersonaResponse {
                text: SEARCH_FALLBACK_TEXT.to_string(),
                model: engine.model().to_string(),
                usage: None,
                from_cache: None,
                meta: Some(ResponseMeta {
                    used_fallback: true,
                }),
            }
        }
    }
}
