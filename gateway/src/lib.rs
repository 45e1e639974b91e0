//! # Persona gateway
//!
//! HTTP service wiring for the persona pipeline: configuration, the
//! response cache and admission controller, the chat/health/telegram
//! routes, and the Telegram transport.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod cache;
pub mod config;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod telegram;

pub use config::AppConfig;
pub use state::AppState;

/// Builds the application router: all routes plus the admission middleware.
/// Transport-wide layers (trace, CORS) are added by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::handle))
        .route("/api/chat", post(routes::chat::handle))
        .route("/api/telegram/webhook", post(routes::telegram::webhook))
        .route(
            "/api/telegram/register-webhook",
            post(routes::telegram::register_webhook),
        )
        .route(
            "/api/telegram/webhook-info",
            get(routes::telegram::webhook_info),
        )
        .route("/api/telegram/stats", get(routes::telegram::stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
}
