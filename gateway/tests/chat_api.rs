//! Route-level tests for the chat endpoint and admission middleware, run
//! against the real router with a scripted completion client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use embedding::Embedder;
use knowledge::KnowledgeIndex;
use llm_client::{ChatMessage, Completion, CompletionClient, CompletionOptions};
use persona_core::SystemClock;
use persona_engine::PersonaEngine;
use persona_gateway::config::{
    AppConfig, CacheConfig, Environment, RateLimitConfig, TelegramConfig,
};
use persona_gateway::{router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<VecDeque<anyhow::Result<Completion>>>,
    call_count: Mutex<usize>,
}

impl ScriptedClient {
    fn push_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(Completion {
            text: text.to_string(),
            model: "test-model".to_string(),
            usage: None,
        }));
    }

    fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> anyhow::Result<Completion> {
        *self.call_count.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left")))
    }
}

struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, anyhow::Error> {
        Ok(vec![0.0])
    }
}

fn test_config(rate_limit_max: u32) -> AppConfig {
    AppConfig {
        env: Environment::Test,
        port: 0,
        openai_api_key: Some("test-key".to_string()),
        openai_model: "test-model".to_string(),
        openai_org_id: None,
        allowed_origins: vec![],
        rate_limit: RateLimitConfig {
            window_ms: 60_000,
            max: rate_limit_max,
        },
        cache: CacheConfig {
            ttl_seconds: 120,
            max_entries: 50,
        },
        telegram: TelegramConfig {
            bot_token: None,
            webhook_secret: None,
            session_ttl_ms: 1_800_000,
            max_history: 20,
        },
        knowledge_dir: std::env::temp_dir(),
    }
}

fn test_app(
    client: Arc<ScriptedClient>,
    rate_limit_max: u32,
) -> (axum::Router, Arc<AppState>, TempDir) {
    let dir = TempDir::new().unwrap();
    let knowledge = Arc::new(KnowledgeIndex::new(dir.path(), Arc::new(NullEmbedder)));
    let clock = Arc::new(SystemClock);
    let engine = Arc::new(PersonaEngine::new(
        client,
        knowledge,
        "test-model".to_string(),
        clock.clone(),
    ));
    let state = Arc::new(AppState::new(test_config(rate_limit_max), engine, clock));
    (router(state.clone()), state, dir)
}

fn chat_request(body: serde_json::Value, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn chat_generates_then_serves_from_cache() {
    let client = Arc::new(ScriptedClient::default());
    client.push_text("the answer");
    let (app, _state, _dir) = test_app(client.clone(), 100);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "Tell me about Belize" }]
    });

    let first = app
        .clone()
        .oneshot(chat_request(body.clone(), "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get("x-cache").is_none());
    let first_body = body_json(first).await;
    assert_eq!(first_body["text"], "the answer");
    assert_eq!(first_body["usedSearch"], false);
    assert!(first_body.get("fromCache").is_none());

    // Same normalized window, different whitespace and case: cache hit.
    let variant = serde_json::json!({
        "messages": [{ "role": "user", "content": "tell me   about BELIZE" }]
    });
    let second = app
        .clone()
        .oneshot(chat_request(variant, "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    let second_body = body_json(second).await;
    assert_eq!(second_body["text"], "the answer");
    assert_eq!(second_body["fromCache"], true);

    // Only the first request reached the upstream model.
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn fresh_queries_bypass_the_cache() {
    let client = Arc::new(ScriptedClient::default());
    // Intel + synthesis for each of the two requests.
    client.push_text("BTC at 60k");
    client.push_text("Sixty grand.");
    client.push_text("BTC at 61k");
    client.push_text("Sixty one grand.");
    let (app, state, _dir) = test_app(client.clone(), 100);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "bitcoin price today" }]
    });

    let first = app
        .clone()
        .oneshot(chat_request(body.clone(), "198.51.100.2"))
        .await
        .unwrap();
    let first_body = body_json(first).await;
    assert_eq!(first_body["usedSearch"], true);
    assert_eq!(first_body["text"], "Sixty grand.");

    let second = app
        .clone()
        .oneshot(chat_request(body, "198.51.100.2"))
        .await
        .unwrap();
    let second_body = body_json(second).await;
    assert_eq!(second_body["text"], "Sixty one grand.");

    // Nothing was cached for a freshness-flagged query.
    assert_eq!(state.cache.len(), 0);
    assert_eq!(client.call_count(), 4);
}

#[tokio::test]
async fn search_failure_returns_fallback_and_is_never_cached() {
    let client = Arc::new(ScriptedClient::default());
    client.push_error("intel upstream down");
    let (app, state, _dir) = test_app(client.clone(), 100);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "Tell me about Belize" }],
        "useSearch": true
    });

    let response = app
        .clone()
        .oneshot(chat_request(body, "198.51.100.3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meta"]["usedFallback"], true);
    assert_eq!(body["usedSearch"], true);
    assert_eq!(state.cache.len(), 0);
}

#[tokio::test]
async fn default_mode_failure_is_a_server_error() {
    let client = Arc::new(ScriptedClient::default());
    client.push_error("synthesis down");
    let (app, state, _dir) = test_app(client, 100);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "Tell me about Belize" }]
    });
    let response = app
        .oneshot(chat_request(body, "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.cache.len(), 0);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let client = Arc::new(ScriptedClient::default());
    let (app, _state, _dir) = test_app(client, 100);

    let empty = serde_json::json!({ "messages": [] });
    let response = app
        .clone()
        .oneshot(chat_request(empty, "198.51.100.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bad_temperature = serde_json::json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "temperature": 9.0
    });
    let response = app
        .clone()
        .oneshot(chat_request(bad_temperature, "198.51.100.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_content_is_truncated_not_rejected() {
    let client = Arc::new(ScriptedClient::default());
    client.push_text("short reply");
    let (app, _state, _dir) = test_app(client, 100);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "x".repeat(5000) }]
    });
    let response = app
        .oneshot(chat_request(body, "198.51.100.6"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admission_rejects_over_limit_with_metadata() {
    let client = Arc::new(ScriptedClient::default());
    for _ in 0..3 {
        client.push_text("ok");
    }
    let (app, _state, _dir) = test_app(client, 3);

    let body = serde_json::json!({
        "messages": [{ "role": "user", "content": "hello" }]
    });

    for i in 0..3 {
        let response = app
            .clone()
            .oneshot(chat_request(body.clone(), "203.0.113.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {i} admitted");
        let remaining: u32 = response
            .headers()
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(remaining, 2 - i);
    }

    let rejected = app
        .clone()
        .oneshot(chat_request(body.clone(), "203.0.113.7"))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        rejected.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    let retry_after: i64 = rejected
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    // A different client key is unaffected.
    let other = app
        .oneshot(chat_request(body, "203.0.113.8"))
        .await
        .unwrap();
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let client = Arc::new(ScriptedClient::default());
    let (app, _state, _dir) = test_app(client, 1);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn telegram_stats_reports_unconfigured_bot() {
    let client = Arc::new(ScriptedClient::default());
    let (app, _state, _dir) = test_app(client, 100);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/telegram/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["configured"], false);
    assert_eq!(body["activeConversations"], 0);
}
