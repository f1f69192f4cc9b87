// src/fetch.rs
//! Transport seam for plain-text HTTP fetches (feed XML, article HTML).
//! Production goes through one shared reqwest client; tests substitute
//! canned bodies without touching the network.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// Production fetcher. One client, shared timeouts, honest user agent.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("topic-newswire/0.1 (content ingestion bot)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }

    /// Clone of the underlying client for other REST callers (cheap handle).
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let resp = resp
            .error_for_status()
            .with_context(|| format!("GET {url} status"))?;
        resp.text().await.with_context(|| format!("GET {url} body"))
    }
}

/// Map-backed fetcher for tests and offline runs. Unknown URLs fail the
/// same way an unreachable host would.
#[derive(Default)]
pub struct FixtureFetcher {
    bodies: HashMap<String, String>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl TextFetcher for FixtureFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture body for {url}"))
    }
}
