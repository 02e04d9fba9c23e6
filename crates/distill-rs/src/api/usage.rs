//! Token usage and spend accounting for a run.
//!
//! The cost gate works from an estimate made before any call is issued;
//! [`CostTracker`] records what the service actually reported so the run can
//! log real consumption next to that estimate.

/// Flat per-token pricing (USD).
#[derive(Debug, Clone, Copy)]
pub struct TokenPricing {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

impl TokenPricing {
    /// Same price for prompt and completion tokens.
    pub fn flat(per_token: f64) -> Self {
        Self {
            input_per_token: per_token,
            output_per_token: per_token,
        }
    }

    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        prompt_tokens as f64 * self.input_per_token
            + completion_tokens as f64 * self.output_per_token
    }
}

/// Cumulative usage across every generation call of a run.
#[derive(Debug, Default)]
pub struct CostTracker {
    pub calls: u32,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record token usage for one call.
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, pricing: &TokenPricing) {
        self.calls += 1;
        self.total_prompt_tokens += prompt_tokens as u64;
        self.total_completion_tokens += completion_tokens as u64;
        self.estimated_cost_usd += pricing.estimate_cost(prompt_tokens, completion_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "calls: {}, tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.calls,
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}
