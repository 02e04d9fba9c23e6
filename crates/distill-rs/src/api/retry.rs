//! Retry policy for the record fetcher.
//!
//! The review endpoint occasionally answers with 429 or 5xx while paging
//! through large apps. The fetcher treats every non-success response as
//! transient and waits according to a [`RetryConfig`] before asking again.
//! Generation calls are never retried through this policy: a failed call
//! ends the run and the persisted artifacts let the next run resume.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Wait between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl RetryConfig {
    /// Retry forever with the same delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_retries: None,
            delay,
        }
    }

    /// A single attempt.
    pub fn once() -> Self {
        Self {
            max_retries: Some(0),
            delay: Duration::ZERO,
        }
    }

    /// Whether a retry numbered `attempt` (0-indexed) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }
}
