//! Telegram webhook routes.
//!
//! The webhook acknowledges immediately and processes the update in a
//! spawned task; Telegram retries deliveries that do not answer quickly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::state::AppState;
use crate::telegram::{process_update, validate_webhook_secret, TelegramUpdate};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<TelegramUpdate>,
) -> Response {
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !validate_webhook_secret(state.config.telegram.webhook_secret.as_deref(), provided) {
        warn!("invalid telegram webhook secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    if update.update_id.is_none() {
        warn!("invalid telegram update format");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid update format" })),
        )
            .into_response();
    }

    // Acknowledge now; the pipeline runs after the response is sent.
    tokio::spawn(process_update(state, update));
    Json(json!({ "ok": true })).into_response()
}

#[derive(Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: Option<String>,
}

pub async fn register_webhook(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterWebhookRequest>,
) -> Response {
    if state.config.is_production() {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Use the Telegram API directly in production",
                "hint": "curl -X POST 'https://api.telegram.org/bot<token>/setWebhook?url=<webhook_url>'",
            })),
        )
            .into_response();
    }

    let Some(url) = request.url.filter(|u| !u.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing webhook URL" })),
        )
            .into_response();
    };

    let Some(client) = &state.telegram else {
        return service_unconfigured();
    };

    match client
        .set_webhook(&url, state.config.telegram.webhook_secret.as_deref())
        .await
    {
        Ok(success) => Json(json!({ "success": success, "url": url })).into_response(),
        Err(e) => {
            error!(error = %e, "failed to register webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to register webhook" })),
            )
                .into_response()
        }
    }
}

pub async fn webhook_info(State(state): State<Arc<AppState>>) -> Response {
    let Some(client) = &state.telegram else {
        return service_unconfigured();
    };

    match client.webhook_info().await {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            error!(error = %e, "failed to get webhook info");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to get webhook info" })),
            )
                .into_response()
        }
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "activeConversations": state.sessions.active_count(),
        "configured": state.telegram.is_some(),
    }))
}

fn service_unconfigured() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Telegram bot not configured" })),
    )
        .into_response()
}
