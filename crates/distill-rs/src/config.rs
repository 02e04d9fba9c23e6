//! Run configuration.
//!
//! Every limit, price, and prompt a run depends on lives in one immutable
//! [`DistillConfig`] value that is handed to each component when it is
//! built. Defaults reproduce the limits of a 4k-context chat model with
//! 600 tokens reserved for output.
//!
//! # Examples
//!
//! ```
//! use distill_rs::DistillConfig;
//!
//! let config = DistillConfig::default()
//!     .with_model("openai/gpt-4o-mini")
//!     .with_chunk_limits(2_000, 6_000)
//!     .with_max_levels(4);
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::API_KEY_ENV;
use crate::api::retry::RetryConfig;
use crate::error::{DistillError, Result};
use crate::prompts::Prompts;

/// Default model routed through OpenRouter.
pub const DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";

/// Separator placed between texts inside a chunk.
pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";

/// Configuration for a distillation run.
#[derive(Debug, Clone)]
pub struct DistillConfig {
    /// Model identifier. Default: `"openai/gpt-3.5-turbo"`.
    pub model: String,
    /// Output token cap for every generation call. Default: `600`.
    pub max_output_tokens: u32,
    /// Preferred chunk size; crossing it flushes the chunk. Default: `1000`.
    pub soft_max_tokens: usize,
    /// Absolute chunk ceiling (context window minus output). Default: `3400`.
    pub hard_max_tokens: usize,
    /// Records longer than this are never selected. Default: `2500`.
    pub max_tokens_per_record: usize,
    /// Cap on records downloaded per app. Default: `5000`.
    pub max_reviews: usize,
    /// Approximate USD per input token. Default: `0.000004`.
    pub cost_per_token: f64,
    /// Estimated cost above which the run asks for confirmation. Default: `0.05`.
    pub cost_limit: f64,
    /// Approximate processing throughput. Default: `2400`.
    pub tokens_per_minute: usize,
    /// Separator between texts in a chunk. Default: `"\n\n---\n\n"`.
    pub separator: String,
    /// Reduction level cap. Default: `10`.
    pub max_levels: usize,
    /// System prompts for reduction and synthesis.
    pub prompts: Prompts,
    /// Root directory for per-app data. Default: `"."`.
    pub data_dir: PathBuf,
    /// Retry policy for the record fetcher. Default: unbounded, fixed 5s.
    pub fetch_retry: RetryConfig,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 600,
            soft_max_tokens: 1000,
            hard_max_tokens: 3400,
            max_tokens_per_record: 2500,
            max_reviews: 5000,
            cost_per_token: 0.000_004,
            cost_limit: 0.05,
            tokens_per_minute: 2400,
            separator: DEFAULT_SEPARATOR.to_string(),
            max_levels: 10,
            prompts: Prompts::default(),
            data_dir: PathBuf::from("."),
            fetch_retry: RetryConfig::fixed(Duration::from_secs(5)),
        }
    }
}

impl DistillConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the soft and hard chunk limits.
    pub fn with_chunk_limits(mut self, soft_max: usize, hard_max: usize) -> Self {
        self.soft_max_tokens = soft_max;
        self.hard_max_tokens = hard_max;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_max_tokens_per_record(mut self, tokens: usize) -> Self {
        self.max_tokens_per_record = tokens;
        self
    }

    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    /// Set the per-token price and the confirmation threshold.
    pub fn with_cost(mut self, cost_per_token: f64, cost_limit: f64) -> Self {
        self.cost_per_token = cost_per_token;
        self.cost_limit = cost_limit;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Check that the limits are mutually consistent.
    ///
    /// A selected record must always fit in one chunk, so the per-record
    /// limit may not exceed the hard chunk limit.
    pub fn validate(&self) -> Result<()> {
        if self.soft_max_tokens >= self.hard_max_tokens {
            return Err(DistillError::Configuration(format!(
                "soft chunk limit ({}) must be below the hard limit ({})",
                self.soft_max_tokens, self.hard_max_tokens
            )));
        }
        if self.max_tokens_per_record > self.hard_max_tokens {
            return Err(DistillError::Configuration(format!(
                "per-record limit ({}) exceeds the hard chunk limit ({})",
                self.max_tokens_per_record, self.hard_max_tokens
            )));
        }
        if self.max_output_tokens as usize > self.hard_max_tokens {
            return Err(DistillError::Configuration(format!(
                "output limit ({}) exceeds the hard chunk limit ({})",
                self.max_output_tokens, self.hard_max_tokens
            )));
        }
        if self.max_levels == 0 {
            return Err(DistillError::Configuration(
                "at least one reduction level is required".into(),
            ));
        }
        if self.tokens_per_minute == 0 {
            return Err(DistillError::Configuration(
                "tokens_per_minute must be positive".into(),
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(DistillError::Configuration(
                "max_output_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// The OpenRouter key: `explicit` first, then [`API_KEY_ENV`] from the
/// process environment, then the same variable in the dotenv file at
/// `env_file`.
pub fn resolve_api_key(explicit: Option<&str>, env_file: &Path) -> Result<String> {
    pick_api_key(explicit, std::env::var(API_KEY_ENV).ok(), env_file)
}

fn pick_api_key(
    explicit: Option<&str>,
    from_env: Option<String>,
    env_file: &Path,
) -> Result<String> {
    explicit
        .map(str::to_string)
        .or(from_env)
        .or_else(|| dotenv_value(env_file, API_KEY_ENV))
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            DistillError::Configuration(format!(
                "pass --api-key, set {API_KEY_ENV}, or add it to {}",
                env_file.display()
            ))
        })
}

/// Read one variable from a dotenv file without touching the environment.
fn dotenv_value(path: &Path, key: &str) -> Option<String> {
    dotenvy::from_path_iter(path)
        .ok()?
        .filter_map(|item| item.ok())
        .find_map(|(k, v)| (k == key).then_some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_four_k_context_model() {
        let config = DistillConfig::default();
        assert_eq!(config.soft_max_tokens, 1000);
        assert_eq!(config.hard_max_tokens, 3400);
        assert_eq!(config.max_tokens_per_record, 2500);
        assert_eq!(config.max_output_tokens, 600);
        assert_eq!(config.max_levels, 10);
        assert_eq!(config.separator, "\n\n---\n\n");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn soft_limit_must_stay_below_hard_limit() {
        let config = DistillConfig::default().with_chunk_limits(3400, 3400);
        assert!(matches!(
            config.validate(),
            Err(DistillError::Configuration(_))
        ));
    }

    #[test]
    fn record_limit_must_fit_in_a_chunk() {
        let config = DistillConfig::default().with_max_tokens_per_record(5000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn output_limit_must_fit_in_a_chunk() {
        let config = DistillConfig::default()
            .with_chunk_limits(100, 400)
            .with_max_tokens_per_record(300);
        assert!(matches!(
            config.validate(),
            Err(DistillError::Configuration(msg)) if msg.contains("output limit")
        ));
        assert!(config.with_max_output_tokens(400).validate().is_ok());
    }

    #[test]
    fn explicit_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "OPENROUTER_KEY=from-file\n").unwrap();

        let key = pick_api_key(Some("from-flag"), Some("from-env".into()), &env_file).unwrap();
        assert_eq!(key, "from-flag");
        let key = pick_api_key(None, Some("from-env".into()), &env_file).unwrap();
        assert_eq!(key, "from-env");
    }

    #[test]
    fn key_is_read_from_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(
            &env_file,
            "# local secrets\nOTHER=1\nOPENROUTER_KEY=\"sk-or-v1-abc\"\n",
        )
        .unwrap();

        let key = pick_api_key(None, None, &env_file).unwrap();
        assert_eq!(key, "sk-or-v1-abc");
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(".env");
        assert!(matches!(
            pick_api_key(None, None, &missing),
            Err(DistillError::Configuration(_))
        ));
        assert!(pick_api_key(Some("  "), None, &missing).is_err());
    }

    #[test]
    fn zero_levels_rejected() {
        let config = DistillConfig::default().with_max_levels(0);
        assert!(config.validate().is_err());
    }
}
