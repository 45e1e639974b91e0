//! Gateway configuration, loaded from environment variables.
//!
//! `.env` is read by `main` before this runs. Every knob has a default
//! except the upstream credential, which is required only in production;
//! elsewhere generation degrades to an explicit "feature unavailable" error
//! at call time.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value {
            "production" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub session_ttl_ms: i64,
    pub max_history: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_org_id: Option<String>,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub telegram: TelegramConfig,
    pub knowledge_dir: PathBuf,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let env_kind = Environment::parse(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let openai_api_key = env_opt("OPENAI_API_KEY");
        if env_kind == Environment::Production && openai_api_key.is_none() {
            bail!("OPENAI_API_KEY is required in production");
        }

        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            env: env_kind,
            port: env_parsed("PORT", 3000),
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string()),
            openai_org_id: env_opt("OPENAI_ORG_ID"),
            allowed_origins,
            rate_limit: RateLimitConfig {
                window_ms: env_parsed("RATE_LIMIT_WINDOW_MS", 60_000),
                max: env_parsed("RATE_LIMIT_MAX", 30),
            },
            cache: CacheConfig {
                ttl_seconds: env_parsed("CACHE_TTL_SECONDS", 120),
                max_entries: env_parsed("CACHE_MAX_ENTRIES", 200),
            },
            telegram: TelegramConfig {
                bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
                webhook_secret: env_opt("TELEGRAM_WEBHOOK_SECRET"),
                session_ttl_ms: env_parsed("TELEGRAM_SESSION_TTL_MS", 1_800_000),
                max_history: env_parsed("TELEGRAM_MAX_HISTORY", 20),
            },
            knowledge_dir: PathBuf::from(
                env::var("KNOWLEDGE_DIR").unwrap_or_else(|_| "./data/knowledge".to_string()),
            ),
        })
    }

    pub fn is_production(&self) -> bool {
        self.env == Environment::Production
    }
}
