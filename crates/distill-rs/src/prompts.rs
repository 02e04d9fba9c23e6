//! System prompts for the reduction and synthesis calls.
//!
//! Each generation call pairs one of these system prompts with a chunk of
//! review or description text as the user message. Which prompt is used
//! depends on the stage (per-chunk reduction vs. final synthesis) and on the
//! kind of input (raw reviews vs. descriptions produced by an earlier level).

/// Level-0 reduction: raw reviews to a description.
pub const RAW_TO_DESCRIPTION: &str =
    "Describe (use English) in 500 words all opinions about the game based on game reviews.";

/// Final synthesis straight from raw reviews (no reduction ran).
pub const RAW_TO_CONCLUSION: &str =
    "Write a detailed article with an analysis of reviews about the game.";

/// Level L>0 reduction: descriptions to a combined description.
pub const DESCRIPTION_TO_DESCRIPTION: &str = "Combine the descriptions of reviews about the game.";

/// Final synthesis from reduced descriptions.
pub const DESCRIPTION_TO_CONCLUSION: &str =
    "Write a detailed article with an analysis of descriptions of reviews about the game.";

/// The four system prompts used by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub raw_to_description: String,
    pub raw_to_conclusion: String,
    pub description_to_description: String,
    pub description_to_conclusion: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            raw_to_description: RAW_TO_DESCRIPTION.to_string(),
            raw_to_conclusion: RAW_TO_CONCLUSION.to_string(),
            description_to_description: DESCRIPTION_TO_DESCRIPTION.to_string(),
            description_to_conclusion: DESCRIPTION_TO_CONCLUSION.to_string(),
        }
    }
}

impl Prompts {
    /// Reduction prompt for a level: raw input at level 0, descriptions above.
    pub fn reduction(&self, level: usize) -> &str {
        if level == 0 {
            &self.raw_to_description
        } else {
            &self.description_to_description
        }
    }

    /// Synthesis prompt, chosen by whether the input is raw review text.
    pub fn conclusion(&self, from_raw: bool) -> &str {
        if from_raw {
            &self.raw_to_conclusion
        } else {
            &self.description_to_conclusion
        }
    }
}
