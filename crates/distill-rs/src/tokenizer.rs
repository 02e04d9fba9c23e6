//! Token counting.
//!
//! Every limit in a run (per-record, soft/hard chunk, selection budget) is
//! measured with one [`TokenCounter`]. The production counter is a tiktoken
//! BPE chosen from the model name, so chunk sizes computed here line up with
//! what the service will bill and enforce.

use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};
use tracing::debug;

use crate::error::{DistillError, Result};

/// Counts tokens in a text. Must be deterministic and side-effect free.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// tiktoken-backed counter.
pub struct BpeCounter {
    bpe: CoreBPE,
    encoding: String,
}

impl BpeCounter {
    /// Resolve the encoding for a model.
    ///
    /// Accepts routed names like `"openai/gpt-3.5-turbo"` by matching on the
    /// segment after the last `/`. Models tiktoken does not know fall back to
    /// `cl100k_base`; a failure to load the encoding itself is an error.
    pub fn for_model(model: &str) -> Result<Self> {
        let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        match get_bpe_from_model(&name) {
            Ok(bpe) => Ok(Self {
                bpe,
                encoding: name,
            }),
            Err(_) => {
                debug!("No tiktoken mapping for '{model}', using cl100k_base");
                Self::cl100k()
            }
        }
    }

    /// The `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| DistillError::Tokenizer {
            model: "cl100k_base".into(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            bpe,
            encoding: "cl100k_base".into(),
        })
    }

    /// Name of the model or encoding this counter was resolved from.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl TokenCounter for BpeCounter {
    fn count_tokens(&self, text: &str) -> usize {
        // Special-token markers inside reviews are counted as plain text.
        self.bpe.encode_ordinary(text).len()
    }
}

impl std::fmt::Debug for BpeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_tokens() {
        let counter = BpeCounter::cl100k().unwrap();
        assert_eq!(counter.count_tokens(""), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let counter = BpeCounter::cl100k().unwrap();
        let text = "Great co-op, terrible netcode. 7/10 would grind again.";
        let first = counter.count_tokens(text);
        assert!(first > 0);
        assert_eq!(first, counter.count_tokens(text));
    }

    #[test]
    fn longer_text_costs_more() {
        let counter = BpeCounter::cl100k().unwrap();
        let short = counter.count_tokens("fun");
        let long = counter.count_tokens(&"fun and engaging gameplay ".repeat(20));
        assert!(long > short);
    }

    #[test]
    fn routed_model_name_resolves() {
        let counter = BpeCounter::for_model("openai/gpt-3.5-turbo").unwrap();
        assert_eq!(counter.encoding(), "gpt-3.5-turbo");
    }

    #[test]
    fn unknown_model_falls_back_to_cl100k() {
        let counter = BpeCounter::for_model("someone/unknown-model").unwrap();
        assert_eq!(counter.encoding(), "cl100k_base");
    }

    #[test]
    fn special_token_text_is_not_rejected() {
        let counter = BpeCounter::cl100k().unwrap();
        assert!(counter.count_tokens("<|endoftext|>") > 0);
    }
}
