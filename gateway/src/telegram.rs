//! Telegram transport: Bot API client and webhook update processing.
//!
//! The gateway receives updates on its own webhook route and replies with
//! plain Bot API calls; there is no long-polling loop. Conversation context
//! is keyed by chat id, so groups share one history and private chats get
//! their own.

use std::sync::Arc;

use anyhow::{Context, Result};
use persona_core::PersonaMessage;
use persona_engine::{needs_fresh_answer, search_backed_response, GenerateOptions};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

const START_REPLY: &str = "Hey there. John McAfee here. What's on your mind?";
const CLEAR_REPLY: &str = "Memory wiped. Fresh start. What do you want to talk about?";
const MENTION_ONLY_REPLY: &str = "You rang? What's on your mind?";
const PROCESSING_ERROR_REPLY: &str =
    "Something went sideways in the matrix. Give it another shot.";

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Deserialize, Default)]
struct BotProfile {
    #[serde(default)]
    username: Option<String>,
}

/// Thin client over the Telegram Bot API.
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
    /// Bot username, fetched once and reused for mention checks.
    username: OnceCell<String>,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
            username: OnceCell::new(),
        }
    }

    /// Points requests at a different API base (mock servers in tests).
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}/{}", self.api_base, self.token, method)
    }

    /// Sends a message, first with Markdown formatting, retrying as plain
    /// text when Telegram rejects the formatted variant.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let markdown = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text, "parse_mode": "Markdown" }))
            .send()
            .await
            .context("sendMessage request failed")?;

        if markdown.status().is_success() {
            return Ok(());
        }
        let formatted_error = markdown.text().await.unwrap_or_default();
        error!(chat_id, error = %formatted_error, "failed to send formatted message, retrying plain");

        let plain = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .context("sendMessage retry failed")?;

        if !plain.status().is_success() {
            anyhow::bail!("Telegram API error: {}", formatted_error);
        }
        Ok(())
    }

    /// Best-effort typing indicator; failures are logged and ignored.
    pub async fn send_typing(&self, chat_id: i64) {
        let result = self
            .http
            .post(self.method_url("sendChatAction"))
            .json(&json!({ "chat_id": chat_id, "action": "typing" }))
            .send()
            .await;
        if let Err(e) = result {
            warn!(chat_id, error = %e, "failed to send typing indicator");
        }
    }

    /// The bot's username, lowercased, cached after the first successful
    /// fetch. `None` when Telegram cannot be reached.
    pub async fn bot_username(&self) -> Option<String> {
        let fetched = self
            .username
            .get_or_try_init(|| async {
                let envelope: ApiEnvelope<BotProfile> = self
                    .http
                    .get(self.method_url("getMe"))
                    .send()
                    .await?
                    .json()
                    .await?;
                match envelope.result.and_then(|p| p.username) {
                    Some(username) if envelope.ok => Ok(username.to_lowercase()),
                    _ => Err(anyhow::anyhow!("getMe returned no username")),
                }
            })
            .await;

        match fetched {
            Ok(username) => Some(username.clone()),
            Err(e) => {
                warn!(error = %e, "failed to fetch bot username");
                None
            }
        }
    }

    /// Registers `url` as the webhook, passing the secret token when
    /// configured.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<bool> {
        let mut params = json!({ "url": url });
        if let Some(secret) = secret {
            params["secret_token"] = json!(secret);
        }

        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(self.method_url("setWebhook"))
            .json(&params)
            .send()
            .await
            .context("setWebhook request failed")?
            .json()
            .await
            .context("setWebhook returned malformed body")?;

        if !envelope.ok {
            error!("failed to register Telegram webhook");
        }
        Ok(envelope.ok)
    }

    pub async fn webhook_info(&self) -> Result<serde_json::Value> {
        let info = self
            .http
            .get(self.method_url("getWebhookInfo"))
            .send()
            .await
            .context("getWebhookInfo request failed")?
            .json()
            .await
            .context("getWebhookInfo returned malformed body")?;
        Ok(info)
    }
}

/// Constant-shape check of the webhook secret header. An unconfigured
/// secret allows everything, which keeps local development friction-free.
pub fn validate_webhook_secret(configured: Option<&str>, provided: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(expected) => provided == Some(expected),
    }
}

fn is_group_chat(chat_type: &str) -> bool {
    chat_type == "group" || chat_type == "supergroup"
}

/// Checks for an @mention of the bot and strips it. `None` means the bot
/// was not mentioned at all.
pub fn extract_mentioned_message(text: &str, bot_username: &str) -> Option<String> {
    let pattern = format!(r"(?i)@{}\b", regex::escape(bot_username));
    let mention = Regex::new(&pattern).ok()?;
    if !mention.is_match(text) {
        return None;
    }

    let stripped = mention.replace_all(text, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed)
}

fn command_prefix() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(\w+)@\w+").expect("static regex"))
}

/// Normalizes `/cmd@BotName args` to `/cmd args` so commands work in
/// groups.
pub fn normalize_command(text: &str) -> String {
    command_prefix().replace(text, "/$1").to_string()
}

/// Handles one incoming update end to end: mention gating, commands,
/// generation, history, and the reply.
pub async fn process_update(state: Arc<AppState>, update: TelegramUpdate) {
    let Some(client) = &state.telegram else {
        warn!("telegram update received but bot is not configured");
        return;
    };

    let Some(message) = update.message else {
        debug!("ignoring non-message update");
        return;
    };
    let (Some(text), Some(_from)) = (message.text.as_deref(), message.from.as_ref()) else {
        debug!("ignoring non-text update");
        return;
    };

    let chat_id = message.chat.id;
    let is_group = is_group_chat(&message.chat.chat_type);
    // Chat id keys the conversation: shared in groups, private in DMs.
    let conversation_id = chat_id.to_string();

    let mut text = text.trim().to_string();

    if is_group {
        let Some(bot_username) = client.bot_username().await else {
            warn!("could not determine bot username for group mention check");
            return;
        };

        match extract_mentioned_message(&text, &bot_username) {
            None => {
                debug!(chat_id, "ignoring group message without mention");
                return;
            }
            Some(stripped) if stripped.is_empty() => {
                if let Err(e) = client.send_message(chat_id, MENTION_ONLY_REPLY).await {
                    error!(chat_id, error = %e, "failed to reply to bare mention");
                }
                return;
            }
            Some(stripped) => text = stripped,
        }
    }

    info!(
        conversation_id = %conversation_id,
        is_group,
        message_length = text.len(),
        "processing telegram message"
    );

    let command = normalize_command(&text);
    if command.starts_with("/start") || command.starts_with("/clear") {
        state.sessions.clear(&conversation_id);
        let reply = if command.starts_with("/start") {
            START_REPLY
        } else {
            CLEAR_REPLY
        };
        if let Err(e) = client.send_message(chat_id, reply).await {
            error!(chat_id, error = %e, "failed to send command reply");
        }
        return;
    }

    client.send_typing(chat_id).await;

    let user_message = PersonaMessage::user(text.clone());
    let mut messages = state.sessions.history(&conversation_id);
    messages.push(user_message.clone());

    let should_search = needs_fresh_answer(&text);
    let response = if should_search {
        Ok(search_backed_response(&state.engine, &messages, GenerateOptions::default()).await)
    } else {
        state
            .engine
            .generate(&messages, GenerateOptions::default())
            .await
    };

    match response {
        Ok(response) => {
            state.sessions.append(&conversation_id, user_message);
            state.sessions.append(
                &conversation_id,
                PersonaMessage::assistant(response.text.clone()),
            );

            if let Err(e) = client.send_message(chat_id, &response.text).await {
                error!(chat_id, error = %e, "failed to send telegram response");
                return;
            }
            info!(
                conversation_id = %conversation_id,
                is_group,
                response_length = response.text.len(),
                used_search = should_search,
                "sent telegram response"
            );
        }
        Err(e) => {
            // Generation failed: no history is written for this turn.
            error!(conversation_id = %conversation_id, error = %e, "failed to process telegram message");
            if let Err(send_err) = client.send_message(chat_id, PROCESSING_ERROR_REPLY).await {
                error!(chat_id, error = %send_err, "failed to send error reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_extraction_strips_and_collapses() {
        assert_eq!(
            extract_mentioned_message("hey @mybot   what's up", "mybot"),
            Some("hey what's up".to_string())
        );
        assert_eq!(
            extract_mentioned_message("hey @MyBot what's up", "mybot"),
            Some("hey what's up".to_string())
        );
        assert_eq!(extract_mentioned_message("no mention here", "mybot"), None);
        // A bare mention leaves an empty prompt.
        assert_eq!(
            extract_mentioned_message("@mybot", "mybot"),
            Some(String::new())
        );
        // Another user's handle sharing the prefix does not count.
        assert_eq!(
            extract_mentioned_message("ask @mybotfan instead", "mybot"),
            None
        );
    }

    #[test]
    fn command_normalization_strips_bot_suffix() {
        assert_eq!(normalize_command("/start@MyBot"), "/start");
        assert_eq!(normalize_command("/clear@MyBot now"), "/clear now");
        assert_eq!(normalize_command("/start"), "/start");
        assert_eq!(normalize_command("plain text"), "plain text");
    }

    #[test]
    fn webhook_secret_validation() {
        assert!(validate_webhook_secret(None, None));
        assert!(validate_webhook_secret(None, Some("anything")));
        assert!(validate_webhook_secret(Some("s3cret"), Some("s3cret")));
        assert!(!validate_webhook_secret(Some("s3cret"), Some("wrong")));
        assert!(!validate_webhook_secret(Some("s3cret"), None));
    }

    #[test]
    fn group_detection() {
        assert!(is_group_chat("group"));
        assert!(is_group_chat("supergroup"));
        assert!(!is_group_chat("private"));
        assert!(!is_group_chat("channel"));
    }
}
