//! The text-generation seam.
//!
//! Reduction and synthesis only need "system prompt + user text in, text
//! out". [`Generator`] is that contract; [`OpenRouterGenerator`] fulfils it
//! with a chat completion and tests substitute scripted generators.

use futures::future::BoxFuture;

use crate::error::{DistillError, Result};
use crate::{ChatRequest, Message, OpenRouterClient};

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub max_output_tokens: u32,
}

/// Text produced by a call, with the usage the service reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutput {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl GenerationOutput {
    /// Output without usage figures.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

pub type GenerateFuture<'a> = BoxFuture<'a, Result<GenerationOutput>>;

/// Produces text for a system prompt and a user message.
///
/// Uses a boxed future so the trait stays dyn-compatible.
pub trait Generator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerateFuture<'a>;
}

/// [`Generator`] backed by an OpenRouter chat completion.
pub struct OpenRouterGenerator {
    client: OpenRouterClient,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl Generator for OpenRouterGenerator {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> GenerateFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest {
                model: self.model.clone(),
                messages: vec![
                    Message::system(request.system_prompt.as_str()),
                    Message::user(request.user_content.as_str()),
                ],
                max_tokens: request.max_output_tokens,
            };

            let completion = self
                .client
                .chat(&body)
                .await
                .map_err(DistillError::Generation)?;

            let text = completion
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    DistillError::Generation(format!(
                        "empty response (finish_reason: {})",
                        completion.finish_reason.as_deref().unwrap_or("none")
                    ))
                })?;

            let usage = completion.usage.as_ref();
            Ok(GenerationOutput {
                text,
                prompt_tokens: usage.and_then(|u| u.prompt_tokens).unwrap_or(0),
                completion_tokens: usage.and_then(|u| u.completion_tokens).unwrap_or(0),
            })
        })
    }
}
