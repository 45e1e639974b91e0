//! OpenAI implementation of [`CompletionClient`] over the Responses API.
//!
//! The Responses API rather than chat completions: the intel-gathering pass
//! needs the hosted `web_search_preview` tool, which only this endpoint
//! exposes.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use persona_core::TokenUsage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{ChatMessage, Completion, CompletionClient, CompletionOptions};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ResponsesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct InputItem {
    role: &'static str,
    content: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<UsageStats>,
}

/// Output items other than messages (tool call records and the like) carry
/// no content and fall through the defaults.
#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentChunk>,
}

#[derive(Deserialize)]
struct ContentChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct UsageStats {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

fn extract_text(output: &[OutputItem]) -> String {
    output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter(|chunk| chunk.kind == "output_text")
        .map(|chunk| chunk.text.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Client for the OpenAI Responses endpoint.
pub struct OpenAiResponsesClient {
    http: reqwest::Client,
    api_key: String,
    organization: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiResponsesClient {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key,
            organization: None,
            model,
            base_url: OPENAI_API_BASE.to_string(),
        }
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    /// Points requests at an OpenAI-compatible endpoint (mock servers in
    /// tests, proxies in deployment).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CompletionClient for OpenAiResponsesClient {
    #[instrument(skip(self, messages), fields(model = %self.model, message_count = messages.len(), web_search = options.web_search))]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<Completion> {
        let request = ResponsesRequest {
            model: self.model.clone(),
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            input: messages
                .iter()
                .map(|m| InputItem {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                    kind: "message",
                })
                .collect(),
            tools: if options.web_search {
                vec![Tool {
                    kind: "web_search_preview",
                }]
            } else {
                Vec::new()
            },
        };

        let mut builder = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .await
            .context("request to OpenAI responses endpoint failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "OpenAI responses call rejected");
            anyhow::bail!(
                "OpenAI responses call failed with {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let parsed: ResponsesResponse = response
            .json()
            .await
            .context("failed to decode OpenAI responses body")?;

        let text = extract_text(&parsed.output);
        debug!(text_len = text.len(), "completion received");

        Ok(Completion {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_includes_tools_only_for_web_search() {
        let with_tool = ResponsesRequest {
            model: "m".into(),
            temperature: Some(0.2),
            max_output_tokens: Some(400),
            input: vec![InputItem {
                role: "user",
                content: "q".into(),
                kind: "message",
            }],
            tools: vec![Tool {
                kind: "web_search_preview",
            }],
        };
        let json = serde_json::to_value(&with_tool).unwrap();
        assert_eq!(json["tools"][0]["type"], "web_search_preview");
        assert_eq!(json["input"][0]["type"], "message");

        let without_tool = ResponsesRequest {
            model: "m".into(),
            temperature: None,
            max_output_tokens: None,
            input: vec![],
            tools: vec![],
        };
        let json = serde_json::to_value(&without_tool).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn extract_text_joins_message_chunks() {
        let body = serde_json::json!({
            "model": "gpt-4.1-mini",
            "output": [
                {"type": "web_search_call", "status": "completed"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "hello "},
                    {"type": "refusal", "text": "ignored"},
                    {"type": "output_text", "text": "world"},
                ]},
            ],
            "usage": {"input_tokens": 7, "output_tokens": 3, "total_tokens": 10}
        });
        let parsed: ResponsesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(extract_text(&parsed.output), "hello world");
        assert_eq!(parsed.usage.unwrap().total_tokens, Some(10));
    }

    #[test]
    fn extract_text_empty_output_is_empty() {
        let parsed: ResponsesResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(extract_text(&parsed.output), "");
        assert!(parsed.model.is_none());
    }
}
