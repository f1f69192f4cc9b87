// src/config.rs
//! Pipeline configuration: one TOML file, a couple of env overrides, and
//! post-load hardening so odd values cannot wedge a run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_CONFIG_PATH: &str = "NEWSWIRE_CONFIG_PATH";

const ENV_THRESHOLD: &str = "NEWSWIRE_ACCEPTANCE_THRESHOLD";
const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";

/// Widest retention window `harden` lets through; date arithmetic on
/// arbitrarily large day counts overflows.
const MAX_RETENTION_DAYS: i64 = 365;

fn default_retention_days() -> i64 {
    7
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_max_article_length() -> usize {
    15_000
}
fn default_acceptance_threshold() -> f64 {
    0.5
}
fn default_top_n() -> usize {
    5
}
fn default_max_articles_per_topic() -> usize {
    3
}
fn default_classify_delay_ms() -> u64 {
    500
}
fn default_artifact_dir() -> String {
    "artifacts".to_string()
}
fn default_provider() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Trailing window bounding which feed entries are considered.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Per-call HTTP timeout (feeds, pages, classifier, stores).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Char cap on scraped body text.
    #[serde(default = "default_max_article_length")]
    pub max_article_length: usize,
    #[serde(default)]
    pub include_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    /// Minimum confidence for an article to attach to a topic.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Max scores kept per article.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Max articles kept per topic in the artifact.
    #[serde(default = "default_max_articles_per_topic")]
    pub max_articles_per_topic: usize,
    /// Pause between classification requests.
    #[serde(default = "default_classify_delay_ms")]
    pub classify_delay_ms: u64,
    /// Pause between article scrapes; sequential anyway, 0 means no extra wait.
    #[serde(default)]
    pub scrape_delay_ms: u64,
    /// Static default feed URLs; tenant feeds are appended at run time.
    #[serde(default)]
    pub feeds: Vec<String>,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub stores: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    /// Usually left empty here and supplied via OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the platform REST layer (topics, tenant feeds).
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            request_timeout_secs: default_request_timeout_secs(),
            max_article_length: default_max_article_length(),
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            acceptance_threshold: default_acceptance_threshold(),
            top_n: default_top_n(),
            max_articles_per_topic: default_max_articles_per_topic(),
            classify_delay_ms: default_classify_delay_ms(),
            scrape_delay_ms: 0,
            feeds: Vec::new(),
            artifact_dir: default_artifact_dir(),
            classifier: ClassifierConfig::default(),
            stores: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `NEWSWIRE_CONFIG_PATH` or the default path.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(Path::new(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut cfg: PipelineConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.harden();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_THRESHOLD) {
            match v.trim().parse::<f64>() {
                Ok(x) => self.acceptance_threshold = x,
                Err(_) => {
                    tracing::warn!(value = %v, "ignoring unparsable acceptance threshold override")
                }
            }
        }
        if self.classifier.api_key.is_empty() {
            if let Ok(key) = std::env::var(ENV_OPENAI_KEY) {
                self.classifier.api_key = key;
            }
        }
    }

    /// Keep out-of-range values from wedging a run.
    fn harden(&mut self) {
        if !self.acceptance_threshold.is_finite() {
            self.acceptance_threshold = default_acceptance_threshold();
        }
        self.acceptance_threshold = self.acceptance_threshold.clamp(0.0, 1.0);
        self.top_n = self.top_n.max(1);
        self.max_articles_per_topic = self.max_articles_per_topic.max(1);
        self.max_article_length = self.max_article_length.max(1);
        self.retention_days = self.retention_days.clamp(1, MAX_RETENTION_DAYS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_toml(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    #[serial]
    fn empty_file_yields_documented_defaults() {
        let f = write_toml("");
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.max_article_length, 15_000);
        assert_eq!(cfg.acceptance_threshold, 0.5);
        assert_eq!(cfg.top_n, 5);
        assert_eq!(cfg.max_articles_per_topic, 3);
        assert_eq!(cfg.classify_delay_ms, 500);
        assert_eq!(cfg.scrape_delay_ms, 0);
        assert_eq!(cfg.artifact_dir, "artifacts");
        assert_eq!(cfg.classifier.provider, "openai");
    }

    #[test]
    #[serial]
    fn full_file_overrides_every_knob() {
        let f = write_toml(
            r#"
retention_days = 3
request_timeout_secs = 5
max_article_length = 2000
include_keywords = ["cybersecurity"]
exclude_keywords = ["sports"]
acceptance_threshold = 0.7
top_n = 2
max_articles_per_topic = 1
classify_delay_ms = 50
scrape_delay_ms = 25
feeds = ["https://ex.test/rss"]
artifact_dir = "out"

[classifier]
provider = "mock"

[stores]
base_url = "https://api.ex.test"
api_key = "k"
"#,
        );
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.retention_days, 3);
        assert_eq!(cfg.include_keywords, vec!["cybersecurity".to_string()]);
        assert_eq!(cfg.acceptance_threshold, 0.7);
        assert_eq!(cfg.max_articles_per_topic, 1);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.classifier.provider, "mock");
        assert_eq!(cfg.stores.base_url, "https://api.ex.test");
    }

    #[test]
    #[serial]
    fn threshold_env_override_wins_and_is_clamped() {
        let f = write_toml("acceptance_threshold = 0.4\n");
        std::env::set_var(ENV_THRESHOLD, "1.7");
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        std::env::remove_var(ENV_THRESHOLD);
        assert_eq!(cfg.acceptance_threshold, 1.0);
    }

    #[test]
    #[serial]
    fn unparsable_threshold_override_is_ignored() {
        let f = write_toml("acceptance_threshold = 0.4\n");
        std::env::set_var(ENV_THRESHOLD, "very high");
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        std::env::remove_var(ENV_THRESHOLD);
        assert_eq!(cfg.acceptance_threshold, 0.4);
    }

    #[test]
    #[serial]
    fn hardening_floors_the_counts() {
        let f = write_toml("top_n = 0\nmax_articles_per_topic = 0\nretention_days = -2\n");
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.top_n, 1);
        assert_eq!(cfg.max_articles_per_topic, 1);
        assert_eq!(cfg.retention_days, 1);
    }

    // i64::MAX days is parseable TOML but would overflow the window math.
    #[test]
    #[serial]
    fn retention_window_is_clamped_to_a_year() {
        let f = write_toml(&format!("retention_days = {}\n", i64::MAX));
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    #[serial]
    fn api_key_env_fills_only_when_config_left_it_empty() {
        let f = write_toml("[classifier]\napi_key = \"from-file\"\n");
        std::env::set_var(ENV_OPENAI_KEY, "from-env");
        let cfg = PipelineConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.classifier.api_key, "from-file");

        let f2 = write_toml("");
        let cfg2 = PipelineConfig::load_from_path(f2.path()).unwrap();
        std::env::remove_var(ENV_OPENAI_KEY);
        assert_eq!(cfg2.classifier.api_key, "from-env");
    }
}
