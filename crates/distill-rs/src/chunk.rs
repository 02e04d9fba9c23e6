//! Greedy packing of texts into model-sized chunks.
//!
//! Texts are appended to the chunk under construction, joined by the run's
//! separator, while the result stays within the soft limit. The first text
//! that pushes a chunk past the soft limit is kept in it and the chunk is
//! closed, so chunks may exceed the soft limit. A text that would push the
//! chunk past the hard limit starts a new chunk instead. The hard limit is
//! never exceeded.
//!
//! If the whole input joined together already fits under the hard limit the
//! greedy result is discarded and a single chunk holding everything is
//! returned (the collapse rule), which spares a reduction level.

use tracing::debug;

use crate::config::DistillConfig;
use crate::error::{DistillError, Result};
use crate::tokenizer::TokenCounter;

/// A separator-joined run of texts destined for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub token_count: usize,
}

/// Output of one chunking pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
    /// Sum of the emitted chunks' token counts.
    pub total_tokens: usize,
    /// Whether the collapse rule produced the single chunk.
    pub collapsed: bool,
}

impl ChunkSet {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Consume the set, yielding its only chunk.
    pub fn into_single(self) -> Option<Chunk> {
        if self.chunks.len() == 1 {
            self.chunks.into_iter().next()
        } else {
            None
        }
    }
}

/// Soft/hard-limit chunk packer.
pub struct Chunker<'a> {
    counter: &'a dyn TokenCounter,
    soft_max: usize,
    hard_max: usize,
    separator: &'a str,
}

impl<'a> Chunker<'a> {
    pub fn new(
        counter: &'a dyn TokenCounter,
        soft_max: usize,
        hard_max: usize,
        separator: &'a str,
    ) -> Self {
        Self {
            counter,
            soft_max,
            hard_max,
            separator,
        }
    }

    pub fn from_config(counter: &'a dyn TokenCounter, config: &'a DistillConfig) -> Self {
        Self::new(
            counter,
            config.soft_max_tokens,
            config.hard_max_tokens,
            &config.separator,
        )
    }

    /// Pack `texts` into chunks.
    ///
    /// Returns [`DistillError::OversizedText`] if a single text exceeds the
    /// hard limit, since no chunk could hold it. An empty input yields an
    /// empty set.
    pub fn chunk(&self, texts: &[String]) -> Result<ChunkSet> {
        if texts.is_empty() {
            return Ok(ChunkSet::default());
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0;

        for text in texts {
            let candidate = if current.is_empty() {
                text.clone()
            } else {
                format!("{current}{}{text}", self.separator)
            };
            let candidate_tokens = self.counter.count_tokens(&candidate);

            if candidate_tokens > self.hard_max {
                if !current.is_empty() {
                    chunks.push(Chunk {
                        text: std::mem::take(&mut current),
                        token_count: current_tokens,
                    });
                }
                let text_tokens = self.counter.count_tokens(text);
                if text_tokens > self.hard_max {
                    return Err(DistillError::OversizedText {
                        tokens: text_tokens,
                        hard_max: self.hard_max,
                    });
                }
                current = text.clone();
                current_tokens = text_tokens;
            } else if candidate_tokens > self.soft_max {
                chunks.push(Chunk {
                    text: candidate,
                    token_count: candidate_tokens,
                });
                current.clear();
                current_tokens = 0;
            } else {
                current = candidate;
                current_tokens = candidate_tokens;
            }
        }

        if !current.is_empty() {
            chunks.push(Chunk {
                text: current,
                token_count: current_tokens,
            });
        }

        let all_text = texts.join(self.separator);
        let all_tokens = self.counter.count_tokens(&all_text);
        if all_tokens <= self.hard_max {
            debug!(
                "Collapsing {} chunk(s) into one ({all_tokens} tokens <= {})",
                chunks.len(),
                self.hard_max
            );
            return Ok(ChunkSet {
                chunks: vec![Chunk {
                    text: all_text,
                    token_count: all_tokens,
                }],
                total_tokens: all_tokens,
                collapsed: true,
            });
        }

        let total_tokens = chunks.iter().map(|c| c.token_count).sum();
        debug!(
            "Packed {} text(s) into {} chunk(s), {total_tokens} tokens",
            texts.len(),
            chunks.len()
        );
        Ok(ChunkSet {
            chunks,
            total_tokens,
            collapsed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word; the separator "---" is one token.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    const SEP: &str = "\n\n---\n\n";

    fn words(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    fn chunker(counter: &WordCounter) -> Chunker<'_> {
        Chunker::new(counter, 1000, 3400, SEP)
    }

    #[test]
    fn small_corpus_collapses_to_one_chunk() {
        let counter = WordCounter;
        let texts = vec![words("a", 10), words("b", 10)];
        let set = chunker(&counter).chunk(&texts).unwrap();

        assert!(set.collapsed);
        assert_eq!(set.len(), 1);
        assert_eq!(set.chunks[0].text, format!("{}{SEP}{}", texts[0], texts[1]));
        assert_eq!(set.chunks[0].token_count, 21);
        assert_eq!(set.total_tokens, 21);
    }

    #[test]
    fn collapse_overrides_a_multi_chunk_greedy_pass() {
        // Greedy would cut after crossing 1000; the whole thing is 1801 <= 3400.
        let counter = WordCounter;
        let texts = vec![words("a", 900), words("b", 900)];
        let set = chunker(&counter).chunk(&texts).unwrap();
        assert!(set.collapsed);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_tokens, 1801);
    }

    #[test]
    fn five_records_of_nine_hundred_tokens() {
        let counter = WordCounter;
        let texts: Vec<String> = (0..5).map(|i| words(&format!("r{i}"), 900)).collect();
        let set = chunker(&counter).chunk(&texts).unwrap();

        // 900 stays under soft; 900+1+900 crosses soft and is flushed; repeat; last one alone.
        assert!(!set.collapsed);
        assert_eq!(set.len(), 3);
        assert_eq!(set.chunks[0].token_count, 1801);
        assert_eq!(set.chunks[1].token_count, 1801);
        assert_eq!(set.chunks[2].token_count, 900);
        assert_eq!(set.total_tokens, 4502);
        for chunk in &set.chunks {
            assert!(chunk.token_count <= 3400);
            assert_eq!(chunk.token_count, counter.count_tokens(&chunk.text));
        }
    }

    #[test]
    fn soft_limit_is_a_hint_not_a_bound() {
        let counter = WordCounter;
        let chunker = Chunker::new(&counter, 10, 100, SEP);
        let texts = vec![words("a", 8), words("b", 8), words("c", 90)];
        let set = chunker.chunk(&texts).unwrap();

        assert_eq!(set.chunks[0].token_count, 17);
        assert!(set.chunks[0].token_count > 10);
        assert_eq!(set.chunks[1].token_count, 90);
    }

    #[test]
    fn hard_limit_starts_a_new_chunk() {
        let counter = WordCounter;
        let chunker = Chunker::new(&counter, 50, 60, SEP);
        let texts = vec![words("a", 40), words("b", 30), words("c", 45)];
        let set = chunker.chunk(&texts).unwrap();

        // 40 then 40+1+30 > 60: flush "a", start "b"; 30+1+45 > 60: flush "b", start "c".
        let counts: Vec<usize> = set.chunks.iter().map(|c| c.token_count).collect();
        assert_eq!(counts, vec![40, 30, 45]);
        assert!(set.chunks.iter().all(|c| c.token_count <= 60));
    }

    #[test]
    fn every_chunk_respects_the_hard_limit() {
        let counter = WordCounter;
        let chunker = Chunker::new(&counter, 100, 250, SEP);
        let texts: Vec<String> = (1..60)
            .map(|i| words(&format!("t{i}"), (i * 37) % 200 + 1))
            .collect();
        let set = chunker.chunk(&texts).unwrap();

        assert!(!set.collapsed);
        for chunk in &set.chunks {
            assert!(chunk.token_count <= 250, "chunk of {}", chunk.token_count);
        }
        assert_eq!(
            set.total_tokens,
            set.chunks.iter().map(|c| c.token_count).sum::<usize>()
        );
    }

    #[test]
    fn chunking_is_deterministic() {
        let counter = WordCounter;
        let chunker = Chunker::new(&counter, 100, 250, SEP);
        let texts: Vec<String> = (1..40).map(|i| words("z", (i * 13) % 120 + 1)).collect();
        assert_eq!(chunker.chunk(&texts).unwrap(), chunker.chunk(&texts).unwrap());
    }

    #[test]
    fn oversized_text_is_an_error() {
        let counter = WordCounter;
        let chunker = Chunker::new(&counter, 10, 20, SEP);
        let texts = vec![words("a", 5), words("b", 25), words("c", 5)];
        let err = chunker.chunk(&texts).unwrap_err();
        assert!(matches!(
            err,
            DistillError::OversizedText {
                tokens: 25,
                hard_max: 20
            }
        ));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let counter = WordCounter;
        let set = chunker(&counter).chunk(&[]).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.total_tokens, 0);
        assert!(set.into_single().is_none());
    }
}
