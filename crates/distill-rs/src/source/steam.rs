//! Steam store review download.
//!
//! Reviews are paged through the public `appreviews` endpoint with a cursor.
//! Every page is written to `<app>/reviews/batch-NNN.json` and the paging
//! state to `<app>/reviews/last.json` right after, so an interrupted
//! download continues from the last saved page.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Record;
use super::page::extract_display_name;
use crate::api::retry::RetryConfig;
use crate::config::DistillConfig;
use crate::error::{DistillError, Result};
use crate::store::write_json_atomic;

pub const STORE_BASE_URL: &str = "https://store.steampowered.com";

const REVIEW_QUERY: &[(&str, &str)] = &[
    ("json", "1"),
    ("filter", "recent"),
    ("language", "all"),
    ("num_per_page", "1000"),
    ("review_type", "all"),
    ("purchase_type", "all"),
    ("day_range", "9999999"),
    ("start_offset", "0"),
    ("end_offset", "0"),
];

/// Paging state persisted in `last.json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    /// Cursor for the next page. Empty before the first page.
    pub cursor: String,
    /// Number of batch files written so far.
    pub batch: u32,
    pub downloaded: u64,
    /// Expected review count, capped at the configured maximum.
    pub total: u64,
    /// When the last page was saved.
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl FetchState {
    /// Whether a previous sync already fetched everything it expected.
    pub fn is_complete(&self) -> bool {
        self.batch > 0 && self.downloaded >= self.total
    }
}

/// Cached store-page facts about an app.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AppInfo {
    pub app_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ReviewPage {
    query_summary: QuerySummary,
    #[serde(default)]
    reviews: Vec<Value>,
    #[serde(default)]
    cursor: String,
}

#[derive(Deserialize, Debug)]
struct QuerySummary {
    #[serde(default)]
    num_reviews: u64,
    total_reviews: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
enum PageStep {
    /// The page held no reviews; nothing to write.
    Empty,
    /// Write the page. `last` means stop after it.
    Store { last: bool },
}

/// Fold one page into the paging state.
fn advance(state: &mut FetchState, page: &ReviewPage, max_reviews: u64) -> PageStep {
    let num = page.query_summary.num_reviews;
    state.downloaded += num;

    if let Some(total) = page.query_summary.total_reviews {
        if total > max_reviews {
            info!("App has {total} reviews; limiting download to {max_reviews}");
        }
        state.total = total.min(max_reviews);
    }

    if num == 0 {
        return PageStep::Empty;
    }

    let repeated = page.cursor.is_empty() || page.cursor == state.cursor;
    if repeated {
        debug!("Cursor did not advance; stopping after this page");
    }
    state.cursor = page.cursor.clone();
    PageStep::Store {
        last: repeated || state.downloaded >= state.total,
    }
}

/// Downloads and loads the reviews of one app.
pub struct ReviewSource {
    client: reqwest::Client,
    app_id: String,
    app_dir: PathBuf,
    base_url: String,
    max_reviews: u64,
    retry: RetryConfig,
}

impl ReviewSource {
    pub fn new(app_id: impl Into<String>, config: &DistillConfig) -> Result<Self> {
        let app_id = app_id.into();
        let client = reqwest::Client::builder()
            .user_agent("distill-rs/0.1")
            .build()
            .map_err(|e| DistillError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            app_dir: config.data_dir.join(&app_id),
            app_id,
            base_url: STORE_BASE_URL.to_string(),
            max_reviews: config.max_reviews as u64,
            retry: config.fetch_retry.clone(),
        })
    }

    /// Point the source at another store host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    fn reviews_dir(&self) -> PathBuf {
        self.app_dir.join("reviews")
    }

    fn state_path(&self) -> PathBuf {
        self.reviews_dir().join("last.json")
    }

    /// The saved paging state, or a fresh one.
    pub fn load_state(&self) -> Result<FetchState> {
        let path = self.state_path();
        if !path.is_file() {
            return Ok(FetchState::default());
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn reviews_url(&self, cursor: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/appreviews/{}", self.base_url, self.app_id))
            .map_err(|e| DistillError::Fetch(format!("invalid review URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in REVIEW_QUERY {
                query.append_pair(key, value);
            }
            if !cursor.is_empty() {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    /// GET `url`, waiting and retrying on any non-success answer as
    /// `retry` allows.
    async fn get_with_retry(&self, url: &Url, retry: &RetryConfig) -> Result<String> {
        let mut attempt = 0;
        loop {
            let failure = match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .text()
                        .await
                        .map_err(|e| DistillError::Fetch(format!("failed to read body: {e}")));
                }
                Ok(resp) => format!("status code {}", resp.status()),
                Err(e) => e.to_string(),
            };

            if !retry.allows(attempt) {
                return Err(DistillError::Fetch(format!("{url}: {failure}")));
            }
            let delay = retry.delay;
            warn!(
                "Request failed with {failure}. Retrying in {:.0} seconds...",
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Download every review not yet on disk.
    ///
    /// Stops once the expected total is reached, when a page comes back
    /// empty, or when the cursor stops advancing.
    pub async fn sync(&self) -> Result<FetchState> {
        let dir = self.reviews_dir();
        std::fs::create_dir_all(&dir)?;

        let mut state = self.load_state()?;
        if state.is_complete() {
            let synced = state
                .synced_at
                .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
            debug!(
                "Reviews for {} already downloaded ({}/{}, synced {synced})",
                self.app_id, state.downloaded, state.total
            );
            return Ok(state);
        }

        info!("Downloading reviews for {}...", self.app_id);
        loop {
            let url = self.reviews_url(&state.cursor)?;
            let body = self.get_with_retry(&url, &self.retry).await?;
            let page: ReviewPage = serde_json::from_str(&body)
                .map_err(|e| DistillError::Fetch(format!("unexpected review page: {e}")))?;

            let last = match advance(&mut state, &page, self.max_reviews) {
                PageStep::Empty => break,
                PageStep::Store { last } => last,
            };

            let batch_path = dir.join(format!("batch-{:03}.json", state.batch));
            write_json_atomic(&batch_path, &page.reviews)?;
            state.batch += 1;
            state.synced_at = Some(Utc::now());
            write_json_atomic(&self.state_path(), &state)?;

            info!(
                "Batch {}: {}/{} reviews",
                state.batch, state.downloaded, state.total
            );
            if last {
                break;
            }
        }
        info!("Done!");
        Ok(state)
    }

    /// Every downloaded review, batch files in name order.
    pub fn load_records(&self) -> Result<Vec<Record>> {
        let dir = self.reviews_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut batches: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("batch-") && n.ends_with(".json"))
            })
            .collect();
        batches.sort();

        let mut records = Vec::new();
        for path in &batches {
            let json = std::fs::read_to_string(path)?;
            let batch: Vec<Record> = serde_json::from_str(&json).map_err(|e| {
                DistillError::Fetch(format!("failed to parse {}: {e}", path.display()))
            })?;
            records.extend(batch);
        }
        debug!(
            "Loaded {} reviews from {} batch file(s)",
            records.len(),
            batches.len()
        );
        Ok(records)
    }

    /// Store-page facts, cached in `<app>/app_info.json` after the first fetch.
    ///
    /// The page is requested once. A failed request yields an unnamed app and
    /// nothing is cached, so the next run asks again.
    pub async fn app_info(&self) -> Result<AppInfo> {
        let path = self.app_dir.join("app_info.json");
        if path.is_file() {
            let json = std::fs::read_to_string(&path)?;
            return Ok(serde_json::from_str(&json)?);
        }

        let url = Url::parse(&format!("{}/app/{}", self.base_url, self.app_id))
            .map_err(|e| DistillError::Fetch(format!("invalid app URL: {e}")))?;
        let markup = match self.get_with_retry(&url, &RetryConfig::once()).await {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Could not read the store page: {e}");
                return Ok(AppInfo::default());
            }
        };
        let info = AppInfo {
            app_name: extract_display_name(&markup),
        };
        std::fs::create_dir_all(&self.app_dir)?;
        write_json_atomic(&path, &info)?;
        Ok(info)
    }
}
