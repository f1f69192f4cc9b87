//! Topic Newswire, the one-shot pipeline runner.
//! Pulls the feeds, scrapes and classifies fresh articles, writes the
//! topic-mapping artifact, and prints the run summary as JSON. Scheduling
//! (cron, CI job, manual trigger) lives outside this binary.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topic_newswire::classify::openai::build_classifier;
use topic_newswire::config::PipelineConfig;
use topic_newswire::fetch::HttpFetcher;
use topic_newswire::pipeline::Pipeline;
use topic_newswire::stores::{RestTenantFeedStore, RestTopicStore};

/// Compact tracing to stderr; RUST_LOG overrides the default directive.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("topic_newswire=info,pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "pipeline run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = PipelineConfig::load()?;
    // Safe diagnostics: never the key itself.
    tracing::info!(
        feeds = cfg.feeds.len(),
        provider = %cfg.classifier.provider,
        key_len = cfg.classifier.api_key.len(),
        "configuration loaded"
    );
    if cfg.stores.base_url.is_empty() {
        anyhow::bail!("stores.base_url must be set (topic catalog endpoint)");
    }

    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    let fetcher = Arc::new(HttpFetcher::new(timeout)?);
    let client = fetcher.client();
    let topic_store = Arc::new(RestTopicStore::new(
        client.clone(),
        cfg.stores.base_url.as_str(),
        cfg.stores.api_key.as_str(),
    ));
    let tenant_feeds = Arc::new(RestTenantFeedStore::new(
        client,
        cfg.stores.base_url.as_str(),
        cfg.stores.api_key.as_str(),
    ));
    let classifier = build_classifier(&cfg.classifier, timeout, cfg.top_n)?;

    let pipeline = Pipeline::new(cfg, fetcher, topic_store, tenant_feeds, classifier);
    let summary = pipeline.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
