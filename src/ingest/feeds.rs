// src/ingest/feeds.rs
use metrics::counter;
use std::sync::Arc;

use crate::ingest::types::FeedSource;
use crate::stores::TenantFeedStore;

/// Builds the run's feed list: static defaults first, then tenant-defined
/// feeds. A failing tenant lookup degrades to the static list alone.
pub struct FeedResolver {
    static_feeds: Vec<String>,
    tenant_store: Arc<dyn TenantFeedStore>,
}

impl FeedResolver {
    pub fn new(static_feeds: Vec<String>, tenant_store: Arc<dyn TenantFeedStore>) -> Self {
        Self {
            static_feeds,
            tenant_store,
        }
    }

    /// Duplicates are left in place; the article deduplicator collapses any
    /// overlap downstream.
    pub async fn resolve(&self) -> Vec<FeedSource> {
        let mut out: Vec<FeedSource> = self
            .static_feeds
            .iter()
            .map(|u| FeedSource::new(u.as_str()))
            .collect();

        match self.tenant_store.list_active_feed_urls().await {
            Ok(urls) => out.extend(urls.into_iter().map(FeedSource::new)),
            Err(e) => {
                tracing::warn!(error = ?e, "tenant feed list unavailable, using static feeds only");
                counter!("ingest_tenant_feed_errors_total").increment(1);
            }
        }
        out
    }
}
