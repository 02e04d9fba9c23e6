//! API interaction support: retry policy and usage accounting.
//!
//! - [`retry`]: [`RetryConfig`] for the record fetcher (fixed delay,
//!   unbounded by default).
//! - [`usage`]: [`CostTracker`] accumulating the token usage the generation
//!   service reports, for the end-of-run spend line.

pub mod retry;
pub mod usage;

pub use retry::RetryConfig;
pub use usage::CostTracker;
