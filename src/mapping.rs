// src/mapping.rs
//! Fold per-article scores into the per-topic output collection. Pure and
//! deterministic; the artifact store owns serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::classify::ScoredArticle;
use crate::ingest::types::Topic;

/// One article attached to one topic in the output artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// One topic with its ranked articles. Field names are part of the artifact
/// contract consumed by the newsletter and chat features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicArticleMapping {
    pub topic_id: i64,
    pub topic_title: String,
    pub module_id: i64,
    pub module_title: String,
    pub articles: Vec<MappedArticle>,
}

/// Build the final mapping:
/// 1) every (article, score) pair at or above `threshold` lands in its
///    topic's bucket, skipping URLs already present there, stopping at `cap`;
/// 2) buckets are re-sorted descending by confidence and truncated to `cap`;
/// 3) topics with no qualifying article are omitted; output order is
///    (module id, topic id) so consecutive runs diff cleanly.
pub fn aggregate(
    scored: &[ScoredArticle],
    topics: &[Topic],
    threshold: f64,
    cap: usize,
) -> Vec<TopicArticleMapping> {
    let by_id: HashMap<i64, &Topic> = topics.iter().map(|t| (t.topic_id, t)).collect();

    let mut buckets: HashMap<i64, Vec<MappedArticle>> = HashMap::new();
    for sa in scored {
        for score in &sa.scores {
            if score.confidence < threshold {
                continue;
            }
            if !by_id.contains_key(&score.topic_id) {
                continue;
            }
            let bucket = buckets.entry(score.topic_id).or_default();
            if bucket.iter().any(|m| m.url == sa.article.url) {
                continue;
            }
            if bucket.len() >= cap {
                continue;
            }
            bucket.push(MappedArticle {
                title: sa.article.title.clone(),
                url: sa.article.url.clone(),
                source: sa.article.source_label.clone(),
                published_at: sa.article.published_at,
                summary: sa.article.summary.clone(),
                confidence: score.confidence,
                reasoning: score.reasoning.clone(),
            });
        }
    }

    let mut out: Vec<TopicArticleMapping> = buckets
        .into_iter()
        .filter_map(|(topic_id, mut articles)| {
            let topic = by_id.get(&topic_id)?;
            articles.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            });
            articles.truncate(cap);
            Some(TopicArticleMapping {
                topic_id: topic.topic_id,
                topic_title: topic.title.clone(),
                module_id: topic.module_id,
                module_title: topic.module_title.clone(),
                articles,
            })
        })
        .collect();

    out.sort_by_key(|m| (m.module_id, m.topic_id));
    out
}
