//! # Persona engine
//!
//! The generation pipeline's decision core: a freshness classifier, prompt
//! construction for both modes, the two-stage orchestrator, and the
//! search-mode fallback policy. Transports own everything on the wire side;
//! this crate owns what gets asked of the upstream model and what comes
//! back.

mod engine;
mod fallback;
pub mod freshness;
pub mod prompts;
pub mod sanitize;

pub use engine::{GenerateOptions, IntelOutcome, PersonaEngine};
pub use fallback::{search_backed_response, SEARCH_FALLBACK_TEXT};
pub use freshness::needs_fresh_answer;
