// src/artifact.rs
//! Persisted run output: one timestamped JSON file per run, most-recent-wins
//! for consumers. Writes are atomic (temp file, then rename); reads validate
//! the envelope version so schema drift fails loudly.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mapping::TopicArticleMapping;

pub const SCHEMA_VERSION: u32 = 1;

const FILE_PREFIX: &str = "topic-mapping-";
const FILE_SUFFIX: &str = ".json";

/// The versioned envelope around the mapping list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub topics: Vec<TopicArticleMapping>,
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a run's mapping as the newest artifact. Returns the file path.
    pub fn write(
        &self,
        topics: Vec<TopicArticleMapping>,
        generated_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating artifact dir {}", self.dir.display()))?;

        let artifact = Artifact {
            schema_version: SCHEMA_VERSION,
            generated_at,
            topics,
        };
        // Lexically sortable name, so `latest` is a plain max over names.
        // Millisecond precision keeps runs that finish within the same
        // second from overwriting each other.
        let name = format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            generated_at.format("%Y%m%dT%H%M%S%.3fZ")
        );
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        let json = serde_json::to_vec_pretty(&artifact).context("serializing artifact")?;
        fs::write(&tmp, &json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        Ok(path)
    }

    /// Load and validate one artifact file.
    pub fn read(&self, path: &Path) -> Result<Artifact> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading artifact {}", path.display()))?;
        let artifact: Artifact = serde_json::from_str(&raw)
            .with_context(|| format!("decoding artifact {}", path.display()))?;
        if artifact.schema_version != SCHEMA_VERSION {
            bail!(
                "artifact {} has schema version {}, expected {}",
                path.display(),
                artifact.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(artifact)
    }

    /// The most recent artifact by filename ordering, or None when no run
    /// has completed yet.
    pub fn latest(&self) -> Result<Option<Artifact>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // A missing directory just means nothing was written yet.
            Err(_) => return Ok(None),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.context("reading artifact dir entry")?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
                names.push(name);
            }
        }

        let Some(newest) = names.into_iter().max() else {
            return Ok(None);
        };
        self.read(&self.dir.join(newest)).map(Some)
    }

    /// Downstream lookup shape: the latest run's mappings for one module,
    /// restricted to the given topics.
    pub fn select(&self, module_id: i64, topic_ids: &[i64]) -> Result<Vec<TopicArticleMapping>> {
        let Some(artifact) = self.latest()? else {
            return Ok(Vec::new());
        };
        Ok(artifact
            .topics
            .into_iter()
            .filter(|t| t.module_id == module_id && topic_ids.contains(&t.topic_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappedArticle;
    use chrono::TimeZone;

    fn mapping(topic_id: i64, module_id: i64) -> TopicArticleMapping {
        TopicArticleMapping {
            topic_id,
            topic_title: format!("topic {topic_id}"),
            module_id,
            module_title: format!("module {module_id}"),
            articles: vec![MappedArticle {
                title: "A".into(),
                url: "https://ex.test/a".into(),
                source: "Src".into(),
                published_at: Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap(),
                summary: "s".into(),
                confidence: 0.8,
                reasoning: "r".into(),
            }],
        }
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn write_then_latest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.write(vec![mapping(1, 10)], ts(12, 9)).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("20240312T090000.000Z"));

        let got = store.latest().unwrap().unwrap();
        assert_eq!(got.schema_version, SCHEMA_VERSION);
        assert_eq!(got.topics.len(), 1);
        assert_eq!(got.topics[0].topic_id, 1);
        // No stray temp file stays behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn latest_prefers_the_newest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write(vec![mapping(1, 10)], ts(11, 8)).unwrap();
        store.write(vec![mapping(2, 10)], ts(12, 8)).unwrap();
        let got = store.latest().unwrap().unwrap();
        assert_eq!(got.topics[0].topic_id, 2);
    }

    #[test]
    fn same_second_runs_keep_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let t = ts(12, 9);
        let first = store.write(vec![mapping(1, 10)], t).unwrap();
        let second = store
            .write(
                vec![mapping(2, 10)],
                t + chrono::Duration::milliseconds(40),
            )
            .unwrap();
        assert_ne!(first, second);

        let written = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 2, "the earlier artifact must survive");
        assert_eq!(store.latest().unwrap().unwrap().topics[0].topic_id, 2);
    }

    #[test]
    fn empty_dir_and_missing_dir_mean_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.latest().unwrap().is_none());

        let gone = ArtifactStore::new(dir.path().join("never-created"));
        assert!(gone.latest().unwrap().is_none());
    }

    #[test]
    fn version_mismatch_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let bogus = dir.path().join("topic-mapping-20240312T090000Z.json");
        fs::write(
            &bogus,
            r#"{"schemaVersion": 99, "generatedAt": "2024-03-12T09:00:00Z", "topics": []}"#,
        )
        .unwrap();
        let err = store.latest().unwrap_err();
        assert!(err.to_string().contains("schema version 99"));
    }

    #[test]
    fn select_filters_by_module_and_topic_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .write(
                vec![mapping(1, 10), mapping(2, 10), mapping(3, 11)],
                ts(12, 9),
            )
            .unwrap();
        let got = store.select(10, &[2, 3]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].topic_id, 2);

        // Nothing written for an unknown module.
        assert!(store.select(42, &[1]).unwrap().is_empty());
    }

    #[test]
    fn empty_runs_produce_a_readable_empty_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write(Vec::new(), ts(12, 9)).unwrap();
        let got = store.latest().unwrap().unwrap();
        assert!(got.topics.is_empty());
    }
}
