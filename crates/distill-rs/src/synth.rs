//! Final synthesis of the terminal chunk into one article.

use std::path::PathBuf;

use crate::api::usage::{CostTracker, TokenPricing};
use crate::config::DistillConfig;
use crate::error::Result;
use crate::events::{DistillEvent, EventHandler};
use crate::generate::{GenerationRequest, Generator};
use crate::reduce::Terminal;
use crate::store::{Artifact, ArtifactStore};

/// The synthesized article and where its text is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub location: PathBuf,
    /// Served from the store without a generation call.
    pub cached: bool,
}

pub struct Synthesizer<'a> {
    config: &'a DistillConfig,
    generator: &'a dyn Generator,
    store: &'a dyn ArtifactStore,
    events: &'a dyn EventHandler,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        config: &'a DistillConfig,
        generator: &'a dyn Generator,
        store: &'a dyn ArtifactStore,
        events: &'a dyn EventHandler,
    ) -> Self {
        Self {
            config,
            generator,
            store,
            events,
        }
    }

    /// Return the stored summary, or generate and store it.
    ///
    /// The conclusion prompt depends on whether `terminal` is raw review
    /// text or reduced descriptions.
    pub async fn synthesize(&self, terminal: &Terminal, usage: &mut CostTracker) -> Result<Summary> {
        let location = self.store.summary_location();

        if let Some(artifact) = self.store.load_summary()? {
            self.events
                .on_event(&DistillEvent::SummaryCached { location: &location });
            return Ok(Summary {
                text: artifact.output,
                location,
                cached: true,
            });
        }

        let request = GenerationRequest {
            system_prompt: self.config.prompts.conclusion(terminal.from_raw).to_string(),
            user_content: terminal.text.clone(),
            max_output_tokens: self.config.max_output_tokens,
        };
        let output = self.generator.generate(&request).await?;

        self.store.save_summary(&Artifact {
            prompt: request.system_prompt,
            input: request.user_content,
            output: output.text.clone(),
        })?;

        usage.record(
            output.prompt_tokens,
            output.completion_tokens,
            &TokenPricing::flat(self.config.cost_per_token),
        );
        self.events.on_event(&DistillEvent::TokenUsage {
            prompt_tokens: output.prompt_tokens,
            completion_tokens: output.completion_tokens,
        });
        self.events
            .on_event(&DistillEvent::SummaryWritten { location: &location });

        Ok(Summary {
            text: output.text,
            location,
            cached: false,
        })
    }
}
