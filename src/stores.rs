// src/stores.rs
//! Read-only seams onto the platform's REST storage: the module/topic
//! taxonomy and the tenant-managed feed list. Each trait has a production
//! REST implementation and an in-memory fixture for tests and offline runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::Topic;

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// The full taxonomy; fetched once per run.
    async fn list_topics(&self) -> Result<Vec<Topic>>;
}

#[async_trait]
pub trait TenantFeedStore: Send + Sync {
    /// Feed URLs tenants added, restricted to active ones.
    async fn list_active_feed_urls(&self) -> Result<Vec<String>>;
}

// Row shapes as the REST layer returns them.
#[derive(Debug, Deserialize)]
struct TopicRow {
    id: i64,
    title: String,
    module_id: i64,
    module_title: String,
}

#[derive(Debug, Deserialize)]
struct FeedRow {
    url: String,
    #[serde(default)]
    active: bool,
}

pub struct RestTopicStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestTopicStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TopicStore for RestTopicStore {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let url = format!("{}/topics", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("topic store request")?;
        let resp = resp.error_for_status().context("topic store status")?;
        let rows: Vec<TopicRow> = resp.json().await.context("topic store payload")?;
        Ok(rows
            .into_iter()
            .map(|r| Topic {
                topic_id: r.id,
                title: r.title,
                module_id: r.module_id,
                module_title: r.module_title,
            })
            .collect())
    }
}

pub struct RestTenantFeedStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestTenantFeedStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TenantFeedStore for RestTenantFeedStore {
    async fn list_active_feed_urls(&self) -> Result<Vec<String>> {
        let url = format!("{}/tenant-feeds", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("tenant feed store request")?;
        let resp = resp.error_for_status().context("tenant feed store status")?;
        let rows: Vec<FeedRow> = resp.json().await.context("tenant feed store payload")?;
        Ok(rows
            .into_iter()
            .filter(|r| r.active)
            .map(|r| r.url)
            .collect())
    }
}

/// Canned taxonomy for tests and offline runs.
pub struct FixtureTopicStore {
    topics: Vec<Topic>,
}

impl FixtureTopicStore {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }
}

#[async_trait]
impl TopicStore for FixtureTopicStore {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        Ok(self.topics.clone())
    }
}

/// Canned tenant feed list for tests and offline runs.
pub struct FixtureTenantFeedStore {
    urls: Vec<String>,
}

impl FixtureTenantFeedStore {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl TenantFeedStore for FixtureTenantFeedStore {
    async fn list_active_feed_urls(&self) -> Result<Vec<String>> {
        Ok(self.urls.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_rows_default_to_inactive() {
        let rows: Vec<FeedRow> =
            serde_json::from_str(r#"[{"url":"https://a.test/rss","active":true},{"url":"https://b.test/rss"}]"#)
                .unwrap();
        let active: Vec<&FeedRow> = rows.iter().filter(|r| r.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].url, "https://a.test/rss");
    }

    #[test]
    fn topic_rows_map_onto_the_taxonomy_type() {
        let rows: Vec<TopicRow> = serde_json::from_str(
            r#"[{"id":7,"title":"Cybersecurity","module_id":2,"module_title":"Security"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].module_title, "Security");
    }
}
