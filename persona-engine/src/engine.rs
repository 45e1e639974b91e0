//! Generation orchestrator: decides knowledge and intel paths, issues one or
//! two upstream calls, merges usage, and normalizes the output text.

use std::sync::Arc;

use knowledge::{KnowledgeIndex, SearchOptions};
use llm_client::{ChatMessage, CompletionClient, CompletionOptions};
use persona_core::{
    latest_user_content, Clock, EngineError, PersonaMessage, PersonaResponse, Role, TokenUsage,
};
use tracing::{info, instrument, warn};

use crate::prompts;
use crate::sanitize::{sanitize_intel, strip_structural_noise};

/// Retrieval thresholds used for synthesis context. Heuristic constants,
/// deliberately tighter than the index default.
const KNOWLEDGE_TOP_K: usize = 5;
const KNOWLEDGE_MIN_SCORE: f32 = 0.35;

/// The latest user prompt is bounded to its final characters; older text in
/// a single oversized message rarely changes the request.
const MAX_USER_PROMPT_CHARS: usize = 2000;

const INTEL_DEFAULT_MAX_TOKENS: u32 = 400;
const INTEL_MAX_TOKENS_CEILING: u32 = 600;
const INTEL_TEMPERATURE: f32 = 0.2;

const SEARCH_SYNTHESIS_DEFAULT_MAX_TOKENS: u32 = 600;
const SEARCH_SYNTHESIS_MAX_TOKENS_CEILING: u32 = 800;
const SEARCH_SYNTHESIS_TEMPERATURE: f32 = 0.7;

const DEFAULT_TEMPERATURE: f32 = 0.6;
const DEFAULT_MAX_TOKENS: u32 = 400;
/// Longer responses are allowed when there is retrieved material to draw on.
const DEFAULT_MAX_TOKENS_WITH_CONTEXT: u32 = 800;

/// Caller-facing generation parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub enable_search: bool,
}

/// Synthesis-pass variants. Each mode carries exactly the data its prompt
/// construction needs.
enum PassMode<'a> {
    Default,
    Search { intel: &'a str },
}

/// Outcome of the intel-gathering sub-call, kept as an explicit three-way
/// result so the caller makes a policy choice instead of relying on error
/// suppression.
pub enum IntelOutcome {
    /// Usable intel, already sanitized.
    Data {
        text: String,
        usage: Option<TokenUsage>,
    },
    /// The call succeeded but signalled the no-data sentinel or came back
    /// empty.
    NoData,
    Failed(anyhow::Error),
}

struct PassResult {
    text: String,
    model: String,
    usage: Option<TokenUsage>,
}

/// The persona generation engine. Holds the upstream completion client and
/// the knowledge index; all state lives in those collaborators.
pub struct PersonaEngine {
    llm: Arc<dyn CompletionClient>,
    knowledge: Arc<KnowledgeIndex>,
    model: String,
    clock: Arc<dyn Clock>,
}

impl PersonaEngine {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        knowledge: Arc<KnowledgeIndex>,
        model: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            llm,
            knowledge,
            model,
            clock,
        }
    }

    /// Model name reported when no upstream call produced one (fallback
    /// responses).
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates a persona response for the conversation.
    ///
    /// Default mode runs one synthesis pass over the history plus retrieved
    /// knowledge. Search mode first runs the intel-gathering sub-call and
    /// feeds its sanitized result into the synthesis pass; usage from both
    /// calls is merged. Knowledge retrieval is best-effort in both modes;
    /// everything else fails loudly and is left to the caller's policy.
    #[instrument(skip(self, messages), fields(message_count = messages.len(), search = options.enable_search))]
    pub async fn generate(
        &self,
        messages: &[PersonaMessage],
        options: GenerateOptions,
    ) -> Result<PersonaResponse, EngineError> {
        let query = latest_user_content(messages).unwrap_or_default();
        let knowledge_context = self.knowledge_context(query).await;

        if options.enable_search {
            let prompt = self.latest_user_prompt(messages)?;
            let (intel, intel_usage) = match self.gather_intel(&prompt, options).await {
                IntelOutcome::Data { text, usage } => (text, usage),
                IntelOutcome::NoData => return Err(EngineError::NoIntel),
                IntelOutcome::Failed(e) => return Err(EngineError::Upstream(e)),
            };

            let pass = self
                .persona_pass(
                    messages,
                    PassMode::Search { intel: &intel },
                    &knowledge_context,
                    options,
                )
                .await?;

            return Ok(PersonaResponse {
                text: pass.text,
                model: pass.model,
                usage: TokenUsage::merge([intel_usage.as_ref(), pass.usage.as_ref()]),
                from_cache: None,
                meta: None,
            });
        }

        let pass = self
            .persona_pass(messages, PassMode::Default, &knowledge_context, options)
            .await?;

        Ok(PersonaResponse {
            text: pass.text,
            model: pass.model,
            usage: TokenUsage::merge([pass.usage.as_ref()]),
            from_cache: None,
            meta: None,
        })
    }

    /// Best-effort retrieval: any failure inside the index already collapses
    /// to an empty result set, so this only formats and logs.
    async fn knowledge_context(&self, query: &str) -> String {
        let results = self
            .knowledge
            .search(
                query,
                SearchOptions {
                    top_k: KNOWLEDGE_TOP_K,
                    min_score: KNOWLEDGE_MIN_SCORE,
                },
            )
            .await;

        if results.is_empty() {
            return String::new();
        }

        info!(
            result_count = results.len(),
            top_score = results[0].score,
            "knowledge base matches found"
        );
        knowledge::format_context(&results)
    }

    /// The single latest user message, trimmed and bounded to its final
    /// characters. Search mode never sees the full history.
    fn latest_user_prompt(&self, messages: &[PersonaMessage]) -> Result<String, EngineError> {
        let content = latest_user_content(messages).ok_or(EngineError::NoUserPrompt)?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(EngineError::NoUserPrompt);
        }
        Ok(tail_chars(trimmed, MAX_USER_PROMPT_CHARS).to_string())
    }

    /// Intel-gathering sub-call: neutral fact extraction with the web-search
    /// tool, scoped to the latest user prompt and a strict output budget.
    async fn gather_intel(&self, prompt: &str, options: GenerateOptions) -> IntelOutcome {
        let request = vec![
            ChatMessage::system(prompts::WEB_INTEL_SYSTEM_PROMPT),
            ChatMessage::system(prompts::current_date_line(self.clock.now())),
            ChatMessage::user(format!("User request:\n{prompt}")),
        ];

        let completion = match self
            .llm
            .complete(
                request,
                CompletionOptions {
                    temperature: Some(INTEL_TEMPERATURE),
                    max_output_tokens: Some(
                        options
                            .max_output_tokens
                            .unwrap_or(INTEL_DEFAULT_MAX_TOKENS)
                            .min(INTEL_MAX_TOKENS_CEILING),
                    ),
                    web_search: true,
                },
            )
            .await
        {
            Ok(c) => c,
            Err(e) => return IntelOutcome::Failed(e),
        };

        let intel = completion.text.trim().to_string();
        if intel.is_empty() || intel.to_uppercase().contains(prompts::NO_INTEL_SENTINEL) {
            warn!("web search returned no usable intel");
            return IntelOutcome::NoData;
        }

        IntelOutcome::Data {
            text: sanitize_intel(&intel),
            usage: completion.usage,
        }
    }

    /// Persona synthesis call: builds the system preamble for the mode,
    /// appends the conversation, and normalizes the output text. An empty
    /// completion is a hard failure here, never silently papered over.
    async fn persona_pass(
        &self,
        messages: &[PersonaMessage],
        mode: PassMode<'_>,
        knowledge_context: &str,
        options: GenerateOptions,
    ) -> Result<PassResult, EngineError> {
        let mut request = vec![
            ChatMessage::system(prompts::PERSONA_PROMPT),
            ChatMessage::system(prompts::current_date_line(self.clock.now())),
            ChatMessage::system(prompts::PERSONA_REFERENCE),
            ChatMessage::system(match &mode {
                PassMode::Search { intel } => prompts::search_instruction(intel),
                PassMode::Default => prompts::BASE_PERSONA_INSTRUCTION.to_string(),
            }),
        ];

        if !knowledge_context.is_empty() {
            request.push(ChatMessage::system(prompts::archives_block(
                knowledge_context,
            )));
        }

        if let PassMode::Search { intel } = &mode {
            request.push(ChatMessage::system(prompts::intel_recap(intel)));
        }

        for message in messages {
            request.push(match message.role {
                Role::User => ChatMessage::user(message.content.clone()),
                Role::Assistant => ChatMessage::assistant(message.content.clone()),
            });
        }

        let (temperature, max_output_tokens) = match &mode {
            PassMode::Search { .. } => (
                SEARCH_SYNTHESIS_TEMPERATURE,
                options
                    .max_output_tokens
                    .unwrap_or(SEARCH_SYNTHESIS_DEFAULT_MAX_TOKENS)
                    .min(SEARCH_SYNTHESIS_MAX_TOKENS_CEILING),
            ),
            PassMode::Default => {
                let default_max = if knowledge_context.is_empty() {
                    DEFAULT_MAX_TOKENS
                } else {
                    DEFAULT_MAX_TOKENS_WITH_CONTEXT
                };
                (
                    options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                    options.max_output_tokens.unwrap_or(default_max),
                )
            }
        };

        let completion = self
            .llm
            .complete(
                request,
                CompletionOptions {
                    temperature: Some(temperature),
                    max_output_tokens: Some(max_output_tokens),
                    web_search: false,
                },
            )
            .await?;

        if completion.text.is_empty() {
            warn!("synthesis response missing text output");
            return Err(EngineError::EmptyCompletion);
        }

        Ok(PassResult {
            text: strip_structural_noise(&completion.text),
            model: completion.model,
            usage: completion.usage,
        })
    }
}

/// Final `max_chars` characters of `text`, on a char boundary.
fn tail_chars(text: &str, max_chars: usize) -> &str {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text;
    }
    let skip = char_count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
