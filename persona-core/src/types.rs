//! Core message and response types, one-to-one with the service's JSON wire
//! format (camelCase field names).

use serde::{Deserialize, Serialize};

/// Role of a conversation message. System messages never appear here; they
/// are built by the engine, not accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation message. Order within a sequence is significant:
/// the most recent user message drives retrieval and freshness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaMessage {
    pub role: Role,
    pub content: String,
}

impl PersonaMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Returns the content of the most recent user message, if any.
pub fn latest_user_content(messages: &[PersonaMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

/// Token usage reported by an upstream call. Fields the upstream did not
/// report stay `None` and serialize as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    /// Sums usage records field-wise, treating missing fields as zero.
    /// An all-zero result collapses to `None` rather than a degenerate zero
    /// record, and zero individual fields are dropped the same way.
    pub fn merge<'a>(usages: impl IntoIterator<Item = Option<&'a TokenUsage>>) -> Option<TokenUsage> {
        let mut input = 0u64;
        let mut output = 0u64;
        let mut total = 0u64;

        for usage in usages.into_iter().flatten() {
            input += usage.input_tokens.unwrap_or(0);
            output += usage.output_tokens.unwrap_or(0);
            total += usage.total_tokens.unwrap_or(0);
        }

        if input == 0 && output == 0 && total == 0 {
            return None;
        }

        let nonzero = |n: u64| if n == 0 { None } else { Some(n) };
        Some(TokenUsage {
            input_tokens: nonzero(input),
            output_tokens: nonzero(output),
            total_tokens: nonzero(total),
        })
    }
}

/// Response metadata surfaced to transports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub used_fallback: bool,
}

/// A generated persona response. `from_cache` is rewritten on every cache
/// access, never stored statically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaResponse {
    pub text: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl PersonaResponse {
    /// True when this response was substituted by the search fallback policy
    /// and must never be written to the cache.
    pub fn used_fallback(&self) -> bool {
        self.meta.map(|m| m.used_fallback).unwrap_or(false)
    }
}
