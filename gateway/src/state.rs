//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use conversation::ConversationStore;
use persona_core::Clock;
use persona_engine::PersonaEngine;

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;
use crate::telegram::TelegramClient;

/// Maximum concurrent conversation sessions kept in memory.
const MAX_SESSIONS: usize = 1000;

/// Everything a request handler can touch. Each store owns its map; nothing
/// here hands out references into another component's internals.
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<PersonaEngine>,
    pub cache: ResponseCache,
    pub limiter: RateLimiter,
    pub sessions: ConversationStore,
    pub telegram: Option<TelegramClient>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, engine: Arc<PersonaEngine>, clock: Arc<dyn Clock>) -> Self {
        let cache = ResponseCache::new(
            config.cache.max_entries,
            Duration::seconds(config.cache.ttl_seconds as i64),
            clock.clone(),
        );
        let limiter = RateLimiter::new(
            config.rate_limit.max,
            Duration::milliseconds(config.rate_limit.window_ms as i64),
            clock.clone(),
        );
        let sessions = ConversationStore::new(
            MAX_SESSIONS,
            config.telegram.max_history,
            Duration::milliseconds(config.telegram.session_ttl_ms),
            clock,
        );
        let telegram = config
            .telegram
            .bot_token
            .clone()
            .map(TelegramClient::new);

        Self {
            config,
            engine,
            cache,
            limiter,
            sessions,
            telegram,
            started_at: Instant::now(),
        }
    }
}
