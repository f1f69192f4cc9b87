// src/pipeline.rs
//! The run driver: wires the stages together, serializes runs, and reports
//! honest counts. Item failures stay inside their stage; only missing
//! preconditions or a failed terminal write abort a run.

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::artifact::ArtifactStore;
use crate::classify::{classify_all, TopicClassifier};
use crate::config::PipelineConfig;
use crate::fetch::TextFetcher;
use crate::ingest::{self, feeds::FeedResolver};
use crate::mapping::aggregate;
use crate::ratelimit::Pacer;
use crate::scrape::Scraper;
use crate::stores::{TenantFeedStore, TopicStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a pipeline run is already in progress")]
    RunInProgress,
    #[error("topic catalog unavailable: {0}")]
    TopicsUnavailable(anyhow::Error),
    #[error("artifact write failed: {0}")]
    ArtifactWrite(anyhow::Error),
}

/// What the triggering caller gets back. Field names mirror the artifact
/// contract's casing since schedulers log this verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Candidates after fetch + window filtering, before keyword rules.
    pub articles_found: usize,
    /// Articles that reached classification (scraped text present).
    pub articles_processed: usize,
    /// Topics that received at least one qualifying article.
    pub topics_with_articles: usize,
    pub duration_seconds: f64,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs started.");
        describe_counter!(
            "pipeline_articles_processed_total",
            "Articles that reached classification."
        );
        describe_counter!("scrape_failures_total", "Article scrapes that failed.");
        describe_counter!(
            "classify_failures_total",
            "Classification calls that failed or returned unusable content."
        );
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the pipeline last started a run."
        );
        describe_histogram!("pipeline_run_seconds", "Wall-clock run duration.");
    });
}

pub struct Pipeline {
    cfg: PipelineConfig,
    fetcher: Arc<dyn TextFetcher>,
    topic_store: Arc<dyn TopicStore>,
    resolver: FeedResolver,
    scraper: Scraper,
    classifier: Arc<dyn TopicClassifier>,
    artifacts: ArtifactStore,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        fetcher: Arc<dyn TextFetcher>,
        topic_store: Arc<dyn TopicStore>,
        tenant_feeds: Arc<dyn TenantFeedStore>,
        classifier: Arc<dyn TopicClassifier>,
    ) -> Self {
        let resolver = FeedResolver::new(cfg.feeds.clone(), tenant_feeds);
        let scraper = Scraper::new(Arc::clone(&fetcher), cfg.max_article_length);
        let artifacts = ArtifactStore::new(&cfg.artifact_dir);
        Self {
            cfg,
            fetcher,
            topic_store,
            resolver,
            scraper,
            classifier,
            artifacts,
            run_lock: Mutex::new(()),
        }
    }

    /// Read access for downstream consumers colocated with the pipeline.
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// One full run. Rejects immediately if another run holds the lock.
    pub async fn run_once(&self) -> Result<RunSummary, PipelineError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress)?;

        ensure_metrics_described();
        let t0 = Instant::now();
        let run_started = Utc::now();
        counter!("pipeline_runs_total").increment(1);
        gauge!("pipeline_last_run_ts").set(run_started.timestamp() as f64);

        // 1) Preconditions: without the taxonomy a run is meaningless.
        let topics = self
            .topic_store
            .list_topics()
            .await
            .map_err(PipelineError::TopicsUnavailable)?;
        tracing::info!(target: "pipeline", topics = topics.len(), "topic catalog loaded");

        // 2) Resolve feeds and pull candidates within the window, concurrently.
        let feeds = self.resolver.resolve().await;
        let since = run_started - ChronoDuration::days(self.cfg.retention_days);
        let candidates =
            ingest::fetch_candidates(Arc::clone(&self.fetcher), &feeds, since).await;
        let articles_found = candidates.len();

        // 3) Keyword rules, then dedup.
        let filtered = ingest::filter_keywords(
            candidates,
            &self.cfg.include_keywords,
            &self.cfg.exclude_keywords,
        );
        let deduped = ingest::dedupe(filtered);
        tracing::info!(
            target: "pipeline",
            feeds = feeds.len(),
            found = articles_found,
            kept = deduped.len(),
            "candidates selected"
        );

        // 4) Sequential scrape; empty bodies fall out here.
        let mut scrape_pacer = Pacer::from_millis(self.cfg.scrape_delay_ms);
        let enriched = self.scraper.scrape_all(deduped, &mut scrape_pacer).await;
        let (with_body, skipped): (Vec<_>, Vec<_>) =
            enriched.into_iter().partition(|e| !e.body_text.is_empty());
        if !skipped.is_empty() {
            tracing::info!(
                target: "pipeline",
                skipped = skipped.len(),
                "articles without scraped text excluded from classification"
            );
        }
        let articles_processed = with_body.len();
        counter!("pipeline_articles_processed_total").increment(articles_processed as u64);

        // 5) Sequential, paced classification.
        let mut classify_pacer = Pacer::from_millis(self.cfg.classify_delay_ms);
        let scored = classify_all(
            self.classifier.as_ref(),
            with_body,
            &topics,
            self.cfg.top_n,
            &mut classify_pacer,
        )
        .await;

        // 6) Aggregate and persist. An empty run still writes its artifact.
        let mappings = aggregate(
            &scored,
            &topics,
            self.cfg.acceptance_threshold,
            self.cfg.max_articles_per_topic,
        );
        let topics_with_articles = mappings.len();
        let path = self
            .artifacts
            .write(mappings, run_started)
            .map_err(PipelineError::ArtifactWrite)?;

        let duration_seconds = t0.elapsed().as_secs_f64();
        histogram!("pipeline_run_seconds").record(duration_seconds);
        tracing::info!(
            target: "pipeline",
            found = articles_found,
            processed = articles_processed,
            topics = topics_with_articles,
            artifact = %path.display(),
            "run complete"
        );

        Ok(RunSummary {
            articles_found,
            articles_processed,
            topics_with_articles,
            duration_seconds,
        })
    }
}
