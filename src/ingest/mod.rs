// src/ingest/mod.rs
pub mod feeds;
pub mod parser;
pub mod types;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;

use crate::fetch::TextFetcher;
use crate::ingest::types::{CandidateArticle, FeedSource};

/// One-time metrics registration for the ingest stages.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "ingest_tenant_feed_errors_total",
            "Tenant feed list lookup failures."
        );
        describe_counter!(
            "ingest_candidates_total",
            "Candidate articles emitted by the fetch stage."
        );
    });
}

/// Fetch and parse every feed concurrently. A feed that fails to download or
/// parse contributes an empty list; the others are unaffected. The result is
/// the concatenation of all per-feed results in feed order.
pub async fn fetch_candidates(
    fetcher: Arc<dyn TextFetcher>,
    feeds: &[FeedSource],
    since: DateTime<Utc>,
) -> Vec<CandidateArticle> {
    ensure_metrics_described();

    let tasks = feeds.iter().map(|feed| {
        let fetcher = Arc::clone(&fetcher);
        let url = feed.url.clone();
        async move {
            match fetch_one(fetcher.as_ref(), &url, since).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %url, "feed fetch failed");
                    counter!("ingest_feed_errors_total").increment(1);
                    Vec::new()
                }
            }
        }
    });

    let out: Vec<CandidateArticle> = join_all(tasks).await.into_iter().flatten().collect();
    counter!("ingest_candidates_total").increment(out.len() as u64);
    out
}

async fn fetch_one(
    fetcher: &dyn TextFetcher,
    url: &str,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<CandidateArticle>> {
    let xml = fetcher.get_text(url).await?;
    parser::parse_feed(url, &xml, since)
}

/// Include/exclude keyword rules over a lowercased title+summary blob.
/// Exclude wins over include; an empty include list accepts everything that
/// survives the excludes. Plain substring semantics ("ai" matches "said").
pub fn filter_keywords(
    articles: Vec<CandidateArticle>,
    include: &[String],
    exclude: &[String],
) -> Vec<CandidateArticle> {
    let lower = |kws: &[String]| -> Vec<String> {
        kws.iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.to_lowercase())
            .collect()
    };
    let include = lower(include);
    let exclude = lower(exclude);

    articles
        .into_iter()
        .filter(|a| {
            let blob = format!("{} {}", a.title, a.summary).to_lowercase();
            if exclude.iter().any(|k| blob.contains(k)) {
                return false;
            }
            include.is_empty() || include.iter().any(|k| blob.contains(k))
        })
        .collect()
}

/// Collapse exact `(url, title)` duplicates, newest first. The sort is
/// stable, so reapplying the function changes nothing.
pub fn dedupe(mut articles: Vec<CandidateArticle>) -> Vec<CandidateArticle> {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(articles.len());
    for a in articles {
        if seen.insert((a.url.clone(), a.title.clone())) {
            out.push(a);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FixtureFetcher;
    use chrono::TimeZone;

    fn mk(title: &str, url: &str, summary: &str, ts: i64) -> CandidateArticle {
        CandidateArticle {
            title: title.into(),
            url: url.into(),
            published_at: DateTime::from_timestamp(ts, 0).unwrap(),
            summary: summary.into(),
            source_label: "Test".into(),
        }
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn exclude_beats_include() {
        let arts = vec![mk(
            "AI wins the sports cup",
            "https://ex.test/1",
            "an ai story",
            100,
        )];
        let got = filter_keywords(arts, &kw(&["ai"]), &kw(&["sports"]));
        assert!(got.is_empty());
    }

    #[test]
    fn substring_match_is_not_word_aware() {
        // "ai" hides inside "said"; that is the documented behavior.
        let arts = vec![mk("He said hello", "https://ex.test/2", "", 100)];
        let got = filter_keywords(arts, &kw(&["ai"]), &[]);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn include_matching_is_case_insensitive() {
        let arts = vec![
            mk("CYBERSECURITY daily", "https://ex.test/3", "", 100),
            mk("Gardening tips", "https://ex.test/4", "", 100),
        ];
        let got = filter_keywords(arts, &kw(&["Cybersecurity"]), &[]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].url, "https://ex.test/3");
    }

    #[test]
    fn empty_include_list_accepts_everything_not_excluded() {
        let arts = vec![
            mk("Anything", "https://ex.test/5", "", 100),
            mk("Spam casino", "https://ex.test/6", "", 100),
        ];
        let got = filter_keywords(arts, &[], &kw(&["casino"]));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].url, "https://ex.test/5");
    }

    #[test]
    fn dedupe_collapses_url_title_pairs_and_sorts_newest_first() {
        let arts = vec![
            mk("A", "https://ex.test/a", "", 100),
            mk("B", "https://ex.test/b", "", 300),
            mk("A", "https://ex.test/a", "", 200),
            // Same URL, different title: a distinct identity, kept.
            mk("A2", "https://ex.test/a", "", 150),
        ];
        let got = dedupe(arts);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].title, "B");
        assert!(got.windows(2).all(|w| w[0].published_at >= w[1].published_at));
    }

    #[test]
    fn dedupe_is_idempotent() {
        let arts = vec![
            mk("A", "https://ex.test/a", "", 100),
            mk("A", "https://ex.test/a", "", 200),
            mk("B", "https://ex.test/b", "", 50),
        ];
        let once = dedupe(arts);
        let twice = dedupe(once.clone());
        assert_eq!(once.len(), twice.len());
        for (x, y) in once.iter().zip(twice.iter()) {
            assert_eq!(x.url, y.url);
            assert_eq!(x.title, y.title);
            assert_eq!(x.published_at, y.published_at);
        }
    }

    #[tokio::test]
    async fn one_bad_feed_does_not_poison_the_others() {
        let xml = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
  <item><title>Fresh</title><link>https://ex.test/fresh</link>
    <pubDate>{}</pubDate></item>
</channel></rss>"#,
            Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap().to_rfc2822()
        );
        let fetcher = Arc::new(FixtureFetcher::new().with("https://good.test/rss", &xml));
        let feeds = vec![
            FeedSource::new("https://good.test/rss"),
            FeedSource::new("https://down.test/rss"),
        ];
        let since = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let got = fetch_candidates(fetcher, &feeds, since).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "Fresh");
    }
}
