//! A full run: select, chunk, gate, reduce, synthesize.
//!
//! # Example
//!
//! ```ignore
//! let config = DistillConfig::default();
//! let counter = BpeCounter::for_model(&config.model)?;
//! let generator = OpenRouterGenerator::new(OpenRouterClient::new(key)?, &config.model);
//! let store = FsArtifactStore::for_run(&config.data_dir, "2398120", &params)?;
//!
//! let outcome = Pipeline::new(&config, &counter, &generator, &store)
//!     .with_event_handler(&LoggingHandler)
//!     .run(&records, &params)
//!     .await?;
//! ```

use tracing::info;

use crate::api::usage::CostTracker;
use crate::chunk::Chunker;
use crate::config::DistillConfig;
use crate::cost::{self, Confirmation, CostEstimate, StdinConfirmation};
use crate::error::{DistillError, Result};
use crate::events::{DistillEvent, EventHandler, NoopHandler};
use crate::generate::Generator;
use crate::reduce::ReductionController;
use crate::select::{SelectionParams, Selector};
use crate::source::Record;
use crate::store::ArtifactStore;
use crate::synth::{Summary, Synthesizer};
use crate::tokenizer::TokenCounter;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        summary: Summary,
        usage: CostTracker,
    },
    /// The cost gate was declined; nothing was generated or stored.
    Declined,
}

pub struct Pipeline<'a> {
    config: &'a DistillConfig,
    counter: &'a dyn TokenCounter,
    generator: &'a dyn Generator,
    store: &'a dyn ArtifactStore,
    confirmation: &'a dyn Confirmation,
    events: &'a dyn EventHandler,
}

impl<'a> Pipeline<'a> {
    /// A pipeline that asks on the terminal when over the cost limit and
    /// emits no events.
    pub fn new(
        config: &'a DistillConfig,
        counter: &'a dyn TokenCounter,
        generator: &'a dyn Generator,
        store: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            config,
            counter,
            generator,
            store,
            confirmation: &StdinConfirmation,
            events: &NoopHandler,
        }
    }

    pub fn with_confirmation(mut self, confirmation: &'a dyn Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_event_handler(mut self, events: &'a dyn EventHandler) -> Self {
        self.events = events;
        self
    }

    pub async fn run(&self, records: &[Record], params: &SelectionParams) -> Result<RunOutcome> {
        self.config.validate()?;

        let selection = Selector::new(self.counter, self.config).select(records, params);
        self.events.on_event(&DistillEvent::Selected {
            selected: selection.len(),
            available: records.len(),
            selected_tokens: selection.selected_tokens,
        });
        if selection.is_empty() {
            return Err(DistillError::EmptySelection);
        }
        info!("Analyze {} reviews", selection.len());

        let chunker = Chunker::from_config(self.counter, self.config);
        let chunks = chunker.chunk(&selection.texts)?;

        let estimate = CostEstimate::new(chunks.total_tokens, self.config);
        let within_limit = !estimate.exceeds(self.config.cost_limit);
        self.events.on_event(&DistillEvent::CostEstimated {
            estimate: &estimate,
            within_limit,
        });
        if !cost::gate(
            &estimate,
            self.config,
            params.token_limit.is_some(),
            self.confirmation,
        )? {
            return Ok(RunOutcome::Declined);
        }

        let mut usage = CostTracker::new();
        let controller = ReductionController::new(
            self.config,
            chunker,
            self.generator,
            self.store,
            self.events,
        );
        let terminal = controller.run(chunks, &mut usage).await?;

        if terminal.from_raw {
            info!(
                "Make a summary of all reviews ({} total tokens)",
                terminal.token_count
            );
        } else {
            info!(
                "Make a summary from descriptions ({} total tokens)",
                terminal.token_count
            );
        }

        let summary = Synthesizer::new(self.config, self.generator, self.store, self.events)
            .synthesize(&terminal, &mut usage)
            .await?;

        if usage.calls > 0 {
            info!("Usage: {}", usage.summary());
        }
        Ok(RunOutcome::Completed { summary, usage })
    }
}
