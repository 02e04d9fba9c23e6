//! Where the records come from.
//!
//! A [`Record`] is one user review as the store page serves it. Only the
//! text takes part in summarization; the remaining fields ride along in
//! [`Record::attributes`] so the downloaded batches keep everything the
//! endpoint returned.

pub mod page;
pub mod steam;

pub use page::extract_display_name;
pub use steam::{AppInfo, FetchState, ReviewSource};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One review.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    #[serde(rename = "review", default)]
    pub text: String,
    #[serde(default)]
    pub language: String,
    /// Every other field of the review object.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            attributes: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_object_keeps_unknown_fields() {
        let json = r#"{
            "recommendationid": "149361283",
            "language": "english",
            "review": "Runs great on the Deck.",
            "voted_up": true,
            "author": {"steamid": "7656", "playtime_forever": 1200}
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.text, "Runs great on the Deck.");
        assert_eq!(record.language, "english");
        assert_eq!(record.attributes["voted_up"], Value::Bool(true));
        assert_eq!(record.attributes["author"]["playtime_forever"], 1200);
        assert!(!record.attributes.contains_key("review"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["review"], "Runs great on the Deck.");
        assert_eq!(back["recommendationid"], "149361283");
    }

    #[test]
    fn missing_text_reads_as_empty() {
        let record: Record = serde_json::from_str(r#"{"language": "german"}"#).unwrap();
        assert!(record.text.is_empty());
    }
}
