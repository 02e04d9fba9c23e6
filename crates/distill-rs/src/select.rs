//! Record selection under a token budget.
//!
//! Without a budget every eligible record is taken in source order. With a
//! budget the records are first shuffled with a seeded RNG, so the same
//! `(token_limit, seed)` pair always samples the same reviews, and then
//! accepted greedily while the running total (each record plus one
//! separator) stays strictly below the limit.
//!
//! Stored artifacts are keyed by the selection parameters alone, so a seed
//! must give the same order on every build. The shuffle uses its own
//! SplitMix64 generator and Fisher-Yates pass for that reason.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::DistillConfig;
use crate::source::Record;
use crate::tokenizer::TokenCounter;

/// Default shuffle seed.
pub const DEFAULT_SEED: u64 = 1;

/// SplitMix64. Its sequence for a given seed never changes.
#[derive(Debug, Clone)]
struct SelectionRng {
    state: u64,
}

impl SelectionRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl RngCore for SelectionRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Fisher-Yates from the back, drawing each index as the high word of
/// `next_u64() * (i + 1)`.
fn shuffle<T>(items: &mut [T], rng: &mut impl RngCore) {
    for i in (1..items.len()).rev() {
        let j = ((u128::from(rng.next_u64()) * (i as u128 + 1)) >> 64) as usize;
        items.swap(i, j);
    }
}

/// Parameters that determine which records a run selects.
///
/// They also name the run's artifact namespace: two runs with equal
/// parameters over the same records share every cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionParams {
    /// Total token budget. `None` selects every eligible record.
    pub token_limit: Option<usize>,
    /// Shuffle seed, only consulted when a budget is set.
    pub seed: u64,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            token_limit: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl SelectionParams {
    pub fn new(token_limit: Option<usize>, seed: Option<u64>) -> Self {
        Self {
            token_limit,
            seed: seed.unwrap_or(DEFAULT_SEED),
        }
    }

    /// Short stable identifier: 8 hex chars of SHA-256 over `"<limit>:<seed>"`.
    pub fn hash(&self) -> String {
        let limit = self
            .token_limit
            .map_or_else(|| "none".to_string(), |l| l.to_string());
        let digest = Sha256::digest(format!("{limit}:{}", self.seed).as_bytes());
        format!("{digest:x}").chars().take(8).collect()
    }
}

/// Result of a selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Accepted texts in visit order.
    pub texts: Vec<String>,
    /// Tokens of accepted texts plus one separator each.
    pub selected_tokens: usize,
    /// Tokens of every record visited, accepted or not.
    pub total_tokens: usize,
    pub rejected_empty: usize,
    pub rejected_oversized: usize,
    pub rejected_budget: usize,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Filters and samples records into the texts a run will reduce.
pub struct Selector<'a> {
    counter: &'a dyn TokenCounter,
    max_tokens_per_record: usize,
    separator_tokens: usize,
}

impl<'a> Selector<'a> {
    pub fn new(counter: &'a dyn TokenCounter, config: &DistillConfig) -> Self {
        let separator_tokens = counter.count_tokens(&config.separator);
        debug!("Separator tokens: {separator_tokens}");
        Self {
            counter,
            max_tokens_per_record: config.max_tokens_per_record,
            separator_tokens,
        }
    }

    /// Select record texts according to `params`.
    pub fn select(&self, records: &[Record], params: &SelectionParams) -> Selection {
        let mut order: Vec<&Record> = records.iter().collect();
        if params.token_limit.is_some() {
            shuffle(&mut order, &mut SelectionRng::new(params.seed));
        }

        let mut selection = Selection::default();

        for (i, record) in order.into_iter().enumerate() {
            let tokens = self.counter.count_tokens(&record.text);
            selection.total_tokens += tokens;

            if tokens == 0 {
                selection.rejected_empty += 1;
                continue;
            }
            if tokens > self.max_tokens_per_record {
                debug!(
                    "review #{i}: {tokens} tokens exceeds per-record limit {}",
                    self.max_tokens_per_record
                );
                selection.rejected_oversized += 1;
                continue;
            }
            let cost = tokens + self.separator_tokens;
            if let Some(limit) = params.token_limit
                && selection.selected_tokens + cost >= limit
            {
                selection.rejected_budget += 1;
                continue;
            }

            selection.texts.push(record.text.clone());
            selection.selected_tokens += cost;
        }

        match params.token_limit {
            Some(limit) => info!(
                "Selected {} of {} reviews: {} / {} / {} tokens (selected / limit / total)",
                selection.len(),
                records.len(),
                selection.selected_tokens,
                limit,
                selection.total_tokens
            ),
            None => info!(
                "Selected {} of {} reviews: {} / {} tokens (selected / total)",
                selection.len(),
                records.len(),
                selection.selected_tokens,
                selection.total_tokens
            ),
        }

        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn words(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    fn records(texts: &[String]) -> Vec<Record> {
        texts.iter().map(|t| Record::new(t.clone(), "english")).collect()
    }

    #[test]
    fn no_limit_selects_every_eligible_record_in_order() {
        let texts: Vec<String> = (0..6).map(|i| words(&format!("r{i}"), 3)).collect();
        let recs = records(&texts);
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        let selection = selector.select(&recs, &SelectionParams::default());
        assert_eq!(selection.texts, texts);
        assert_eq!(selection.selected_tokens, 6 * (3 + 1));
    }

    #[test]
    fn empty_and_oversized_records_are_dropped() {
        let texts = vec![
            words("a", 10),
            String::new(),
            "   ".to_string(),
            words("c", 3000),
            words("b", 10),
        ];
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        let selection = selector.select(&records(&texts), &SelectionParams::default());
        assert_eq!(selection.texts, vec![words("a", 10), words("b", 10)]);
        assert_eq!(selection.rejected_empty, 2);
        assert_eq!(selection.rejected_oversized, 1);
        assert_eq!(selection.total_tokens, 3020);
    }

    #[test]
    fn same_seed_same_selection() {
        let texts: Vec<String> = (0..50).map(|i| words(&format!("w{i}"), 5)).collect();
        let recs = records(&texts);
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());
        let params = SelectionParams::new(Some(100), Some(7));

        let first = selector.select(&recs, &params);
        let second = selector.select(&recs, &params);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn different_seeds_sample_differently() {
        let texts: Vec<String> = (0..50).map(|i| words(&format!("w{i}"), 5)).collect();
        let recs = records(&texts);
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        let a = selector.select(&recs, &SelectionParams::new(Some(60), Some(1)));
        let b = selector.select(&recs, &SelectionParams::new(Some(60), Some(2)));
        assert_ne!(a.texts, b.texts);
    }

    #[test]
    fn budget_never_lands_exactly_on_the_limit() {
        // Each record costs 4 + 1 separator = 5 tokens.
        let texts: Vec<String> = (0..4).map(|i| words(&format!("x{i}"), 4)).collect();
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        let selection = selector.select(&records(&texts), &SelectionParams::new(Some(10), None));
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.selected_tokens, 5);
        assert_eq!(selection.rejected_budget, 3);

        let selection = selector.select(&records(&texts), &SelectionParams::new(Some(11), None));
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.selected_tokens, 10);
    }

    #[test]
    fn budget_rejection_does_not_stop_the_scan() {
        let texts = vec![words("big", 50), words("s", 2)];
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        // Whatever the shuffled order, the 2-word record fits and the 50-word one never does.
        let selection = selector.select(&records(&texts), &SelectionParams::new(Some(20), None));
        assert_eq!(selection.texts, vec![words("s", 2)]);
        assert_eq!(selection.rejected_budget, 1);
    }

    #[test]
    fn rng_matches_splitmix64_reference() {
        let mut rng = SelectionRng::new(0);
        assert_eq!(rng.next_u64(), 0xe220a8397b1dcdaf);
        assert_eq!(rng.next_u64(), 0x6e789e6aa1b965f4);
        assert_eq!(rng.next_u64(), 0x06c45d188009454f);
    }

    #[test]
    fn shuffle_order_is_pinned() {
        let mut items: Vec<usize> = (0..10).collect();
        shuffle(&mut items, &mut SelectionRng::new(42));
        assert_eq!(items, vec![8, 3, 6, 5, 4, 0, 9, 2, 1, 7]);
    }

    #[test]
    fn sampled_selection_order_is_pinned() {
        let texts: Vec<String> = (0..8).map(|i| words(&format!("r{i}"), 3)).collect();
        let counter = WordCounter;
        let selector = Selector::new(&counter, &DistillConfig::default());

        let params = SelectionParams::new(Some(1000), Some(7));
        let selection = selector.select(&records(&texts), &params);
        let expected: Vec<String> = [7, 4, 6, 1, 2, 5, 0, 3]
            .iter()
            .map(|&i| texts[i].clone())
            .collect();
        assert_eq!(selection.texts, expected);
    }

    #[test]
    fn params_hash_is_stable_and_distinct() {
        let a = SelectionParams::new(Some(5000), Some(3));
        assert_eq!(a.hash(), a.hash());
        assert_eq!(a.hash().len(), 8);
        assert_ne!(a.hash(), SelectionParams::new(Some(5000), Some(4)).hash());
        assert_ne!(a.hash(), SelectionParams::default().hash());
        assert_eq!(SelectionParams::new(None, None), SelectionParams::default());
    }
}
