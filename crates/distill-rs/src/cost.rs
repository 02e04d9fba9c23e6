//! Spend and duration estimate, and the confirmation gate in front of it.
//!
//! The estimate is computed once from the level-0 chunking, before any
//! generation call. Above the configured limit the run needs an explicit
//! yes; a no ends the run before anything is generated or stored.

use std::io::{self, BufRead, Write};

use tracing::info;

use crate::config::DistillConfig;
use crate::error::Result;

/// Projected cost of reducing a chunk set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub tokens: usize,
    /// USD.
    pub approx_cost: f64,
    pub approx_minutes: u64,
}

impl CostEstimate {
    pub fn new(tokens: usize, config: &DistillConfig) -> Self {
        let per_minute = config.tokens_per_minute.max(1);
        Self {
            tokens,
            approx_cost: tokens as f64 * config.cost_per_token,
            approx_minutes: tokens.div_ceil(per_minute) as u64,
        }
    }

    pub fn exceeds(&self, limit: f64) -> bool {
        self.approx_cost > limit
    }
}

impl std::fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The analysis will cost approximately {:.3} USD and take about {} minutes",
            self.approx_cost, self.approx_minutes
        )
    }
}

/// Answers the yes/no question asked when an estimate is over the limit.
pub trait Confirmation: Send + Sync {
    fn confirm(&self, estimate: &CostEstimate) -> Result<bool>;
}

/// Always proceeds.
pub struct AutoConfirm;

impl Confirmation for AutoConfirm {
    fn confirm(&self, _estimate: &CostEstimate) -> Result<bool> {
        Ok(true)
    }
}

/// Asks on the terminal until it reads `y` or `n`.
pub struct StdinConfirmation;

impl StdinConfirmation {
    fn ask(input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
        loop {
            write!(output, "Do you want to continue? (y/n): ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                // EOF: nobody is there to say yes.
                return Ok(false);
            }
            match line.trim().to_lowercase().as_str() {
                "y" => return Ok(true),
                "n" => return Ok(false),
                _ => writeln!(output, "Invalid input. Please enter 'y' or 'n'.")?,
            }
        }
    }
}

impl Confirmation for StdinConfirmation {
    fn confirm(&self, _estimate: &CostEstimate) -> Result<bool> {
        Self::ask(&mut io::stdin().lock(), &mut io::stderr())
    }
}

/// Log the estimate and, when it is over the limit, ask for confirmation.
///
/// Returns whether the run should proceed. `has_token_limit` only affects
/// the hint printed when the caller could have sampled fewer records.
pub fn gate(
    estimate: &CostEstimate,
    config: &DistillConfig,
    has_token_limit: bool,
    confirmation: &dyn Confirmation,
) -> Result<bool> {
    if !estimate.exceeds(config.cost_limit) {
        info!("{estimate}");
        return Ok(true);
    }

    info!("{estimate}. Limit is {} USD", config.cost_limit);
    if !has_token_limit {
        info!("Consider using the -t <num> switch to limit the selection of reviews.");
    }
    let proceed = confirmation.confirm(estimate)?;
    if !proceed {
        info!("Exiting without generating anything");
    }
    Ok(proceed)
}
