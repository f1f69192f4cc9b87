// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single feed URL scheduled for fetching in the current run.
/// Resolved fresh each run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A feed entry that passed date/window filtering, prior to scraping.
/// Dedup identity is the `(url, title)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateArticle {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub source_label: String,
}

/// A candidate plus its scraped body text. An empty body means scraping
/// failed or found nothing; such articles never reach classification.
#[derive(Debug, Clone)]
pub struct EnrichedArticle {
    pub article: CandidateArticle,
    pub body_text: String,
}

/// Read-only taxonomy row, fetched once per run from the module/topic store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: i64,
    pub title: String,
    pub module_id: i64,
    pub module_title: String,
}

/// Short stable identifier for logs and diagnostics (never a dedup key).
pub fn article_id(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let out = hasher.finalize();
    out.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}
