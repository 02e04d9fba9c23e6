//! Token-budgeted hierarchical summarization of large review corpora.
//!
//! `distill-rs` turns thousands of short user reviews into one synthesized
//! article through a chat model whose input window is far smaller than the
//! corpus. Reviews are packed into model-sized chunks, each chunk is reduced
//! to a description, the descriptions are re-packed and reduced again, and
//! so on until a single chunk remains for the final synthesis.
//!
//! # Pipeline
//!
//! ```text
//! records ─▶ Selector ─▶ Chunker ─▶ cost gate ─▶ ReductionController ─▶ Synthesizer
//!                            ▲                        │
//!                            └──── derived texts ─────┘
//! ```
//!
//! Every generation call is persisted under its `(level, chunk index)` key
//! before the next one starts, so an interrupted run picks up exactly where
//! it stopped and a finished run replays without any call at all.
//!
//! # Where to find things
//!
//! - **Token accounting:** [`TokenCounter`](tokenizer::TokenCounter) and the
//!   tiktoken-backed [`BpeCounter`](tokenizer::BpeCounter).
//! - **Sampling reviews under a budget:** [`Selector`](select::Selector).
//! - **Packing text into chunks:** [`Chunker`](chunk::Chunker).
//! - **Multi-level reduction:** [`ReductionController`](reduce::ReductionController).
//! - **Final article:** [`Synthesizer`](synth::Synthesizer).
//! - **Spend estimate and confirmation:** [`cost`].
//! - **Artifact persistence:** [`ArtifactStore`](store::ArtifactStore) and
//!   [`FsArtifactStore`](store::FsArtifactStore).
//! - **Everything wired together:** [`Pipeline`](pipeline::Pipeline).
//! - **Fetching Steam reviews:** [`source`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`DistillConfig`]: limits, prices, prompts, data directory |
//! | [`tokenizer`] | Token counting behind a trait |
//! | [`select`] | Budgeted, seeded record selection |
//! | [`chunk`] | Soft/hard-limit chunk packing with the collapse rule |
//! | [`reduce`] | Level-by-level reduction with resumable caching |
//! | [`synth`] | Final synthesis call |
//! | [`cost`] | Cost/time estimate and confirmation gate |
//! | [`store`] | Derived and summary artifacts keyed by level and index |
//! | [`generate`] | [`Generator`](generate::Generator) trait over the chat API |
//! | [`events`] | Progress events and handlers |
//! | [`source`] | Steam review download and app-name extraction |
//! | [`api`] | Fetch retry policy and usage accounting |

pub mod api;
pub mod chunk;
pub mod config;
pub mod cost;
pub mod error;
pub mod events;
pub mod generate;
pub mod pipeline;
pub mod prompts;
pub mod reduce;
pub mod report;
pub mod select;
pub mod source;
pub mod store;
pub mod synth;
pub mod tokenizer;

pub use config::DistillConfig;
pub use error::{DistillError, Result};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Environment variable holding the OpenRouter API key.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Only the fields a reduction call needs.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from `OpenRouterClient::chat()`.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://crates.io/crates/distill-rs", "distill-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("distill-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

/// Decode a chat completion body into a [`ChatCompletion`].
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed.choices.and_then(|c| c.into_iter().next());
    Ok(match choice {
        Some(c) => ChatCompletion {
            content: c.message.content,
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        },
        None => ChatCompletion {
            content: None,
            usage: parsed.usage,
            finish_reason: None,
        },
    })
}
