//! Level-by-level reduction of chunks down to one.
//!
//! At each level every chunk is sent through the level's reduction prompt and
//! the output stored at `(level, chunk index)`. The stored outputs of the
//! level, read back by key scan, are re-chunked to form the next level. The
//! loop ends when a chunking yields a single chunk, which becomes the input
//! of the final synthesis.
//!
//! A chunk whose artifact already exists is never sent again, so a run that
//! failed halfway resumes at the first missing key and a finished run makes
//! no calls at all.

use tracing::{debug, info};

use crate::api::usage::{CostTracker, TokenPricing};
use crate::chunk::{ChunkSet, Chunker};
use crate::config::DistillConfig;
use crate::error::{DistillError, Result};
use crate::events::{DistillEvent, EventHandler};
use crate::generate::{GenerationRequest, Generator};
use crate::store::{Artifact, ArtifactStore};

/// The single chunk left once reduction converges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub text: String,
    pub token_count: usize,
    /// True when no reduction ran and `text` is raw record text.
    pub from_raw: bool,
    /// Number of reduction levels that were processed.
    pub levels: usize,
}

pub struct ReductionController<'a> {
    config: &'a DistillConfig,
    chunker: Chunker<'a>,
    generator: &'a dyn Generator,
    store: &'a dyn ArtifactStore,
    events: &'a dyn EventHandler,
}

impl<'a> ReductionController<'a> {
    pub fn new(
        config: &'a DistillConfig,
        chunker: Chunker<'a>,
        generator: &'a dyn Generator,
        store: &'a dyn ArtifactStore,
        events: &'a dyn EventHandler,
    ) -> Self {
        Self {
            config,
            chunker,
            generator,
            store,
            events,
        }
    }

    /// Reduce `initial` (the level-0 chunking of the selected records).
    ///
    /// Generation failures end the run immediately; every artifact stored
    /// before the failure stays in place. Returns
    /// [`DistillError::NonConvergence`] if more than one chunk remains after
    /// the configured number of levels.
    pub async fn run(&self, initial: ChunkSet, usage: &mut CostTracker) -> Result<Terminal> {
        if initial.len() <= 1 {
            let chunk = initial.into_single().ok_or(DistillError::EmptySelection)?;
            debug!("Single chunk of raw text, no reduction needed");
            return Ok(Terminal {
                text: chunk.text,
                token_count: chunk.token_count,
                from_raw: true,
                levels: 0,
            });
        }

        let pricing = TokenPricing::flat(self.config.cost_per_token);
        let mut chunks = initial;

        for level in 0..self.config.max_levels {
            self.events.on_event(&DistillEvent::LevelStart {
                level,
                chunks: chunks.len(),
                total_tokens: chunks.total_tokens,
            });

            self.reduce_level(level, &chunks, &pricing, usage).await?;

            let outputs: Vec<String> = self
                .store
                .load_level(level)?
                .into_iter()
                .map(|(_, artifact)| artifact.output)
                .collect();
            self.events.on_event(&DistillEvent::LevelComplete {
                level,
                outputs: outputs.len(),
            });

            chunks = self.chunker.chunk(&outputs)?;
            if chunks.len() <= 1 {
                let chunk = chunks
                    .into_single()
                    .ok_or_else(|| DistillError::Store(format!("level {level} has no outputs")))?;
                info!(
                    "Descriptions converged to one text ({} tokens) after {} stage(s)",
                    chunk.token_count,
                    level + 1
                );
                return Ok(Terminal {
                    text: chunk.text,
                    token_count: chunk.token_count,
                    from_raw: false,
                    levels: level + 1,
                });
            }
        }

        Err(DistillError::NonConvergence {
            levels: self.config.max_levels,
        })
    }

    async fn reduce_level(
        &self,
        level: usize,
        chunks: &ChunkSet,
        pricing: &TokenPricing,
        usage: &mut CostTracker,
    ) -> Result<()> {
        let prompt = self.config.prompts.reduction(level);

        for (index, chunk) in chunks.chunks.iter().enumerate() {
            if self.store.has_derived(level, index)? {
                self.events
                    .on_event(&DistillEvent::ChunkSkipped { level, index });
                continue;
            }

            let request = GenerationRequest {
                system_prompt: prompt.to_string(),
                user_content: chunk.text.clone(),
                max_output_tokens: self.config.max_output_tokens,
            };
            let output = self.generator.generate(&request).await?;

            self.store.save_derived(
                level,
                index,
                &Artifact {
                    prompt: request.system_prompt,
                    input: request.user_content,
                    output: output.text.clone(),
                },
            )?;

            usage.record(output.prompt_tokens, output.completion_tokens, pricing);
            self.events.on_event(&DistillEvent::TokenUsage {
                prompt_tokens: output.prompt_tokens,
                completion_tokens: output.completion_tokens,
            });
            self.events.on_event(&DistillEvent::ChunkReduced {
                level,
                index,
                input_tokens: chunk.token_count,
                output: &output.text,
            });
        }
        Ok(())
    }
}
