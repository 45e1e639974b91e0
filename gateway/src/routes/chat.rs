//! POST /api/chat: the HTTP face of the generation pipeline.
//!
//! Order of operations per request: truncate oversized content, validate,
//! window to the last messages, decide search mode, consult the cache unless
//! bypassed, generate, write back, respond. Fallback responses and bypassed
//! requests never touch the cache.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use persona_core::{latest_user_content, EngineError, PersonaMessage, PersonaResponse, Role};
use persona_engine::{needs_fresh_answer, search_backed_response, GenerateOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::cache::MAX_CONTEXT_MESSAGES;
use crate::state::AppState;

/// Hard cap on assistant message content; also the cap applied when replayed
/// history is windowed back into a request.
pub const MAX_RESPONSE_CHARS: usize = 2500;
/// Hard cap on user message content.
pub const MAX_USER_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<PersonaMessage>,
    #[serde(default)]
    pub use_search: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponseBody {
    #[serde(flatten)]
    response: PersonaResponse,
    used_search: bool,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Clips a message's content to its role's cap, with an ellipsis marker.
/// Truncation happens before validation so an oversized message degrades
/// instead of failing the request.
fn truncate_message(message: &mut PersonaMessage) {
    let max = match message.role {
        Role::Assistant => MAX_RESPONSE_CHARS,
        Role::User => MAX_USER_CHARS,
    };
    if message.content.chars().count() > max {
        let clipped: String = message.content.chars().take(max.saturating_sub(3)).collect();
        message.content = format!("{clipped}...");
    }
}

fn validate(request: &ChatRequest) -> Result<(), &'static str> {
    if request.messages.is_empty() {
        return Err("Provide at least one message");
    }
    if request
        .messages
        .iter()
        .any(|message| message.content.trim().is_empty())
    {
        return Err("Message content required");
    }
    if let Some(temperature) = request.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err("temperature must be between 0 and 2");
        }
    }
    if let Some(max_tokens) = request.max_output_tokens {
        if !(64..=2048).contains(&max_tokens) {
            return Err("maxOutputTokens must be between 64 and 2048");
        }
    }
    Ok(())
}

/// Windows the conversation to the most recent messages and clips replayed
/// assistant turns.
fn limit_messages(messages: Vec<PersonaMessage>) -> Vec<PersonaMessage> {
    let start = messages.len().saturating_sub(MAX_CONTEXT_MESSAGES);
    messages
        .into_iter()
        .skip(start)
        .map(|mut message| {
            if message.role == Role::Assistant
                && message.content.chars().count() > MAX_RESPONSE_CHARS
            {
                let clipped: String = message.content.chars().take(MAX_RESPONSE_CHARS).collect();
                message.content = format!("{clipped} …");
            }
            message
        })
        .collect()
}

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<ChatRequest>,
) -> Response {
    for message in &mut request.messages {
        truncate_message(message);
    }

    if let Err(reason) = validate(&request) {
        warn!(
            message_count = request.messages.len(),
            reason, "invalid chat payload"
        );
        return error_body(StatusCode::BAD_REQUEST, reason);
    }

    // Outside production a missing credential degrades to "unavailable"
    // instead of failing startup.
    if state.config.openai_api_key.is_none() {
        warn!(reason = %EngineError::MissingApiKey, "chat request rejected");
        return error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "Generation is unavailable: no upstream credential configured.",
        );
    }

    let messages = limit_messages(request.messages);
    let used_search = request.use_search.unwrap_or_else(|| {
        latest_user_content(&messages)
            .map(needs_fresh_answer)
            .unwrap_or(false)
    });

    // Search-mode and freshness-flagged responses are non-reproducible:
    // neither served from cache nor written back.
    let bypass_cache = used_search
        || latest_user_content(&messages)
            .map(needs_fresh_answer)
            .unwrap_or(false);

    let mut cache_key = None;
    if !bypass_cache {
        let lookup = state.cache.lookup(&messages);
        cache_key = lookup.key;
        if let Some(cached) = lookup.cached {
            info!("serving chat response from cache");
            let mut response = Json(ChatResponseBody {
                response: cached,
                used_search,
            })
            .into_response();
            response
                .headers_mut()
                .insert("x-cache", HeaderValue::from_static("HIT"));
            return response;
        }
    }

    let options = GenerateOptions {
        temperature: request.temperature,
        max_output_tokens: request.max_output_tokens,
        enable_search: false,
    };

    let persona_response = if used_search {
        search_backed_response(&state.engine, &messages, options).await
    } else {
        match state.engine.generate(&messages, options).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "chat route failed");
                return error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went sideways. Try again shortly.",
                );
            }
        }
    };

    if !bypass_cache && !persona_response.used_fallback() {
        if let Some(key) = cache_key.or_else(|| crate::cache::ResponseCache::fingerprint(&messages))
        {
            state.cache.store(&key, &persona_response);
        }
    }

    Json(ChatResponseBody {
        response: persona_response,
        used_search,
    })
    .into_response()
}
