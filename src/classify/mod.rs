// src/classify/mod.rs
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::ingest::types::{article_id, CandidateArticle, EnrichedArticle, Topic};
use crate::ratelimit::Pacer;

/// One topic the classifier judged relevant for one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScore {
    pub topic_id: i64,
    pub confidence: f64,
    pub reasoning: String,
}

/// Raw entry as the external service returns it, keyed by topic title;
/// resolution back to topic ids happens here, uniformly for every backend.
#[derive(Debug, Clone)]
pub struct RawScore {
    pub title: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// An article together with its resolved scores. Body text is dropped at
/// this point; the aggregator only needs the candidate fields.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: CandidateArticle,
    pub scores: Vec<TopicScore>,
}

/// The semantic-scoring seam. Implementations return title-keyed raw
/// entries or an error; both outcomes stay scoped to the one article.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn score(&self, article: &EnrichedArticle, topics: &[Topic]) -> Result<Vec<RawScore>>;
    fn name(&self) -> &'static str;
}

/// Classify the whole batch strictly sequentially, paced between requests.
/// A failed or unparseable response leaves that article with no scores.
pub async fn classify_all(
    classifier: &dyn TopicClassifier,
    articles: Vec<EnrichedArticle>,
    topics: &[Topic],
    top_n: usize,
    pacer: &mut Pacer,
) -> Vec<ScoredArticle> {
    let mut out = Vec::with_capacity(articles.len());
    for enriched in articles {
        pacer.pace().await;
        let scores = match classifier.score(&enriched, topics).await {
            Ok(raw) => resolve_scores(raw, topics, top_n),
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    article = %article_id(&enriched.article.url),
                    classifier = classifier.name(),
                    "classification failed"
                );
                counter!("classify_failures_total").increment(1);
                Vec::new()
            }
        };
        out.push(ScoredArticle {
            article: enriched.article,
            scores,
        });
    }
    out
}

/// Title-keyed raw entries → ranked `TopicScore`s:
/// 1) case-insensitive exact title match against the known taxonomy,
///    unknown titles dropped (with a near-miss debug log);
/// 2) confidence forced into [0,1], non-finite values collapse to 0.0;
/// 3) highest first, one entry per topic, at most `top_n`.
pub fn resolve_scores(raw: Vec<RawScore>, topics: &[Topic], top_n: usize) -> Vec<TopicScore> {
    let by_title: HashMap<String, &Topic> = topics
        .iter()
        .map(|t| (t.title.trim().to_lowercase(), t))
        .collect();

    let mut scores: Vec<TopicScore> = Vec::with_capacity(raw.len());
    for entry in raw {
        let key = entry.title.trim().to_lowercase();
        let Some(topic) = by_title.get(&key) else {
            log_near_miss(&entry.title, topics);
            continue;
        };
        scores.push(TopicScore {
            topic_id: topic.topic_id,
            confidence: clamp_confidence(entry.confidence),
            reasoning: entry.reasoning,
        });
    }

    scores.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    let mut seen: HashSet<i64> = HashSet::new();
    scores.retain(|s| seen.insert(s.topic_id));
    scores.truncate(top_n);
    scores
}

fn clamp_confidence(c: f64) -> f64 {
    if !c.is_finite() {
        return 0.0;
    }
    c.clamp(0.0, 1.0)
}

/// Surface taxonomy drift: the model answered with a title we don't know.
fn log_near_miss(returned: &str, topics: &[Topic]) {
    let needle = returned.trim().to_lowercase();
    let mut best: Option<(f64, &str)> = None;
    for t in topics {
        let sim = strsim::normalized_levenshtein(&needle, &t.title.to_lowercase());
        if best.map_or(true, |(b, _)| sim > b) {
            best = Some((sim, t.title.as_str()));
        }
    }
    if let Some((similarity, nearest)) = best {
        tracing::debug!(
            returned,
            nearest,
            similarity,
            "classifier title matched no known topic"
        );
    }
}
