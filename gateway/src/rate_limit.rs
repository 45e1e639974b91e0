//! Admission control: a fixed-window request counter per client key.
//!
//! Only `/api` paths are limited. The client key prefers the first address
//! in a forwarded-for chain, then the direct peer, then a shared anonymous
//! bucket; it is a throttling heuristic, not a security boundary. Every
//! decision, admitted or rejected, carries limit/remaining/reset metadata
//! for the transport to surface as headers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use persona_core::Clock;
use regex::Regex;
use tracing::{debug, warn};

use crate::state::AppState;

struct Bucket {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets; set only on rejection.
    pub retry_after_secs: Option<i64>,
}

/// Fixed-window rate limiter over per-client buckets.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    max: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max,
            window,
            clock,
        }
    }

    /// Counts one request against `key` and decides admission. The
    /// read-modify-write runs under a single lock acquisition, so two
    /// concurrent requests never lose an increment.
    pub fn check(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().expect("rate limit lock poisoned");

        match buckets.get_mut(key) {
            Some(bucket) if bucket.reset_at > now => {
                if bucket.count >= self.max {
                    let remaining_ms = (bucket.reset_at - now).num_milliseconds().max(0);
                    return Decision {
                        allowed: false,
                        limit: self.max,
                        remaining: 0,
                        reset_at: bucket.reset_at,
                        retry_after_secs: Some((remaining_ms + 999) / 1000),
                    };
                }
                bucket.count += 1;
                Decision {
                    allowed: true,
                    limit: self.max,
                    remaining: self.max - bucket.count,
                    reset_at: bucket.reset_at,
                    retry_after_secs: None,
                }
            }
            _ => {
                let reset_at = now + self.window;
                buckets.insert(
                    key.to_string(),
                    Bucket { count: 1, reset_at },
                );
                Decision {
                    allowed: true,
                    limit: self.max,
                    remaining: self.max.saturating_sub(1),
                    reset_at,
                    retry_after_secs: None,
                }
            }
        }
    }

    /// Drops buckets whose window already elapsed, bounding memory
    /// independent of traffic shape. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().expect("rate limit lock poisoned");
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.reset_at > now);
        before - buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("rate limit lock poisoned").len()
    }
}

fn rate_limited_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^/api/").expect("static regex"))
}

pub fn should_rate_limit(path: &str) -> bool {
    rate_limited_path().is_match(path)
}

/// Derives the client key from the request. Forwarded-for headers are
/// spoofable; this only has to be stable per well-behaved client.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn attach_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset_secs = (decision.reset_at.timestamp_millis() + 999) / 1000;
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", reset_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Axum middleware applying the limiter to `/api` paths.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !should_rate_limit(&path) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = client_key(request.headers(), peer);
    let decision = state.limiter.check(&key);

    if !decision.allowed {
        warn!(key = %key, path = %path, "rate limit exceeded");
        let retry_after = decision.retry_after_secs.unwrap_or(0);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Easy there. You're hitting this endpoint too fast.",
                "retryAfterSeconds": retry_after,
            })),
        )
            .into_response();
        attach_headers(response.headers_mut(), &decision);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        return response;
    }

    debug!(key = %key, remaining = decision.remaining, "request admitted");
    let mut response = next.run(request).await;
    attach_headers(response.headers_mut(), &decision);
    response
}
