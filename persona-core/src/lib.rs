//! # Persona core
//!
//! Shared types for the persona chat pipeline: messages, responses, token
//! usage accounting, the engine error taxonomy, and the injectable clock used
//! by every time-dependent store.

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::EngineError;
pub use types::{latest_user_content, PersonaMessage, PersonaResponse, ResponseMeta, Role, TokenUsage};
