// src/scrape.rs
//! Full-article body extraction. Fetch failures and unusable pages yield an
//! empty string; the pipeline drops empty bodies before classification.

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;

use crate::fetch::TextFetcher;
use crate::ingest::types::{article_id, CandidateArticle, EnrichedArticle};
use crate::ratelimit::Pacer;

const ELLIPSIS: &str = "...";

/// Region tags whose content is boilerplate, not article body.
const SKIP_REGION_TAGS: [&str; 4] = ["nav", "footer", "header", "aside"];

pub struct Scraper {
    fetcher: Arc<dyn TextFetcher>,
    max_len: usize,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn TextFetcher>, max_len: usize) -> Self {
        Self { fetcher, max_len }
    }

    /// Body text for one article URL, or empty on any failure.
    pub async fn scrape(&self, url: &str) -> String {
        match self.fetcher.get_text(url).await {
            Ok(html) => extract_body_text(&html, self.max_len),
            Err(e) => {
                tracing::warn!(error = ?e, article = %article_id(url), "scrape failed");
                counter!("scrape_failures_total").increment(1);
                String::new()
            }
        }
    }

    /// Strictly sequential scrape of the whole batch, paced between requests
    /// so target sites see at most one fetch per interval.
    pub async fn scrape_all(
        &self,
        articles: Vec<CandidateArticle>,
        pacer: &mut Pacer,
    ) -> Vec<EnrichedArticle> {
        let mut out = Vec::with_capacity(articles.len());
        for article in articles {
            pacer.pace().await;
            let body_text = self.scrape(&article.url).await;
            out.push(EnrichedArticle { article, body_text });
        }
        out
    }
}

/// Paragraph and list-item text with boilerplate removed: script/style/
/// iframe/noscript blocks and comments are stripped up front, then `p`/`li`
/// nodes carrying ad/sidebar classes themselves or sitting under
/// nav/footer/header/aside or ad/sidebar containers are skipped. Output is
/// whitespace-collapsed and char-capped with an ellipsis marker.
pub fn extract_body_text(html: &str, max_len: usize) -> String {
    static RE_NOISE: OnceCell<Regex> = OnceCell::new();
    let re_noise = RE_NOISE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>|<iframe\b[^>]*>.*?</iframe>|<!--.*?-->",
        )
        .unwrap()
    });
    let clean = re_noise.replace_all(html, " ");

    static SELECTOR: OnceCell<Selector> = OnceCell::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("p, li").unwrap());

    let doc = Html::parse_document(&clean);
    let mut parts: Vec<String> = Vec::new();
    for el in doc.select(selector) {
        if in_skipped_region(&el) {
            continue;
        }
        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    let joined = parts.join(" ");
    let collapsed = re_ws.replace_all(&joined, " ").trim().to_string();

    truncate_with_marker(collapsed, max_len)
}

// The node's own tag and class count too, not just its containers'.
fn in_skipped_region(el: &ElementRef) -> bool {
    if is_noise_element(el) {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|anc| is_noise_element(&anc))
}

fn is_noise_element(el: &ElementRef) -> bool {
    SKIP_REGION_TAGS.contains(&el.value().name())
        || el.value().attr("class").is_some_and(has_noise_class)
}

fn has_noise_class(classes: &str) -> bool {
    classes.split_whitespace().any(|t| {
        let t = t.to_ascii_lowercase();
        t == "ad"
            || t == "ads"
            || t.starts_with("ad-")
            || t.contains("advert")
            || t.contains("sidebar")
    })
}

fn truncate_with_marker(s: String, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s;
    }
    let mut out: String = s.chars().take(max_len).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FixtureFetcher;
    use chrono::Utc;

    #[test]
    fn keeps_paragraphs_and_list_items_in_order() {
        let html = r#"<html><body>
            <p>First paragraph.</p>
            <div><ul><li>Point one</li><li>Point two</li></ul></div>
            <p>Last paragraph.</p>
        </body></html>"#;
        let got = extract_body_text(html, 15_000);
        assert_eq!(
            got,
            "First paragraph. Point one Point two Last paragraph."
        );
    }

    #[test]
    fn skips_boilerplate_containers_and_ad_classes() {
        let html = r#"<html><body>
            <header><p>brand banner</p></header>
            <nav><li>Home</li><li>About</li></nav>
            <div class="sidebar-right"><p>trending now</p></div>
            <div class="ad-unit"><p>buy things</p></div>
            <article><p>Real content here.</p></article>
            <footer><p>copyright</p></footer>
        </body></html>"#;
        let got = extract_body_text(html, 15_000);
        assert_eq!(got, "Real content here.");
    }

    #[test]
    fn noise_classes_on_the_text_nodes_themselves_are_skipped() {
        let html = r#"<html><body>
            <p class="ad-disclosure">sponsored note</p>
            <ul><li class="sidebar-promo">subscribe now</li><li>Real point</li></ul>
            <p>Body text.</p>
        </body></html>"#;
        let got = extract_body_text(html, 15_000);
        assert_eq!(got, "Real point Body text.");
    }

    #[test]
    fn strips_script_style_and_iframe_blocks() {
        let html = r#"<html><body>
            <p>Before.</p>
            <script>var x = "<p>not text</p>";</script>
            <style>p { color: red }</style>
            <iframe src="https://ads.test"><p>framed</p></iframe>
            <p>After.</p>
        </body></html>"#;
        let got = extract_body_text(html, 15_000);
        assert_eq!(got, "Before. After.");
    }

    #[test]
    fn truncates_with_ellipsis_marker() {
        let html = format!("<p>{}</p>", "a".repeat(600));
        let got = extract_body_text(&html, 500);
        assert_eq!(got.chars().count(), 503);
        assert!(got.ends_with("..."));
    }

    #[test]
    fn pages_without_content_yield_empty() {
        assert_eq!(extract_body_text("<html><body></body></html>", 100), "");
        assert_eq!(extract_body_text("", 100), "");
        // Not HTML at all still degrades to empty, never panics.
        assert_eq!(extract_body_text("{\"json\": true}", 100), "");
    }

    #[tokio::test]
    async fn fetch_failure_becomes_empty_body() {
        let scraper = Scraper::new(Arc::new(FixtureFetcher::new()), 15_000);
        let article = CandidateArticle {
            title: "X".into(),
            url: "https://down.test/x".into(),
            published_at: Utc::now(),
            summary: String::new(),
            source_label: "T".into(),
        };
        let mut pacer = Pacer::from_millis(0);
        let got = scraper.scrape_all(vec![article], &mut pacer).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body_text, "");
    }
}
