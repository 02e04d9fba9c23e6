//! Progress events emitted while a run reduces and synthesizes.
//!
//! The reduction controller and synthesizer report what they do through
//! [`DistillEvent`]s. Callers implement [`EventHandler`] to observe them for
//! logging, progress display, or test assertions.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or quiet runs |
//! | [`LoggingHandler`] | Stage logs via `tracing` |
//! | [`FnEventHandler`] | Quick closures |
//! | [`CompositeEventHandler`] | Several handlers in order |

use std::path::Path;

use tracing::{debug, info, trace};

use crate::cost::CostEstimate;

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DistillEvent<'a> {
    /// Records were filtered and sampled.
    Selected {
        selected: usize,
        available: usize,
        selected_tokens: usize,
    },
    /// Pre-run estimate, and whether it is under the configured limit.
    CostEstimated {
        estimate: &'a CostEstimate,
        within_limit: bool,
    },
    /// A reduction level is about to be processed.
    LevelStart {
        level: usize,
        chunks: usize,
        total_tokens: usize,
    },
    /// A chunk already has a stored artifact and was not regenerated.
    ChunkSkipped { level: usize, index: usize },
    /// A chunk was reduced and its artifact stored.
    ChunkReduced {
        level: usize,
        index: usize,
        input_tokens: usize,
        output: &'a str,
    },
    /// Token usage reported for one generation call.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Every chunk of a level has a stored artifact.
    LevelComplete { level: usize, outputs: usize },
    /// The summary was already stored; no call was made.
    SummaryCached { location: &'a Path },
    /// The summary was generated and stored.
    SummaryWritten { location: &'a Path },
}

/// Handler for run events. The default implementation ignores everything.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &DistillEvent<'_>) {
        let _ = event;
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&DistillEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&DistillEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&DistillEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &DistillEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &DistillEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Stage logs through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &DistillEvent<'_>) {
        match event {
            DistillEvent::Selected {
                selected,
                available,
                selected_tokens,
            } => {
                info!("Selected {selected}/{available} reviews ({selected_tokens} tokens)");
            }
            DistillEvent::CostEstimated {
                estimate,
                within_limit,
            } => {
                info!(
                    "Estimated {} tokens, ~${:.4}, ~{} min{}",
                    estimate.tokens,
                    estimate.approx_cost,
                    estimate.approx_minutes,
                    if *within_limit { "" } else { " (over limit)" }
                );
            }
            DistillEvent::LevelStart {
                level,
                chunks,
                total_tokens,
            } => {
                info!(
                    "Stage {}: {chunks} chunk(s), {total_tokens} tokens",
                    level + 1
                );
            }
            DistillEvent::ChunkSkipped { level, index } => {
                debug!("[{level}:{index}] already reduced, skipping");
            }
            DistillEvent::ChunkReduced {
                level,
                index,
                input_tokens,
                output,
            } => {
                let preview: String = output.chars().take(120).collect();
                debug!(
                    "[{level}:{index}] {input_tokens} tokens -> {preview}{}",
                    if output.chars().count() > 120 { "..." } else { "" }
                );
            }
            DistillEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                trace!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            DistillEvent::LevelComplete { level, outputs } => {
                info!("Stage {} done: {outputs} description(s)", level + 1);
            }
            DistillEvent::SummaryCached { location } => {
                info!("Summary already exists at {}", location.display());
            }
            DistillEvent::SummaryWritten { location } => {
                info!("Summary written to {}", location.display());
            }
        }
    }
}
