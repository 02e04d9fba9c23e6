//! Error type shared by every stage of a distillation run.

use std::io;

use thiserror::Error;

/// Error type for tokenization, chunking, generation, storage, and fetch
/// failures.
///
/// A declined cost confirmation is not an error; it surfaces as
/// [`RunOutcome::Declined`](crate::pipeline::RunOutcome::Declined).
#[derive(Debug, Error)]
pub enum DistillError {
    #[error("failed to load tokenizer for '{model}': {reason}")]
    Tokenizer { model: String, reason: String },
    #[error("text of {tokens} tokens exceeds the hard chunk limit of {hard_max}")]
    OversizedText { tokens: usize, hard_max: usize },
    #[error("no eligible records were selected")]
    EmptySelection,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("artifact store failure: {0}")]
    Store(String),
    #[error("record fetch failed: {0}")]
    Fetch(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("reduction did not converge to a single chunk within {levels} levels")]
    NonConvergence { levels: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = DistillError> = std::result::Result<T, E>;
