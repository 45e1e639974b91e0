//! # Completion client abstraction
//!
//! Defines the [`CompletionClient`] trait the persona engine calls for both
//! passes, and an OpenAI implementation. The trait is object-safe so tests
//! substitute scripted clients.

use anyhow::Result;
use async_trait::async_trait;
use persona_core::TokenUsage;

mod openai;

pub use openai::OpenAiResponsesClient;

/// Role of a prompt message sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One prompt message for an upstream call.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call parameters. `web_search` selects the tool-enabled variant used
/// by the intel-gathering pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub web_search: bool,
}

/// Result of an upstream completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Concatenated output text; may be empty when the model produced none.
    pub text: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Upstream chat/completion capability.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<Completion>;
}
