// src/ingest/parser.rs
//! Feed XML → candidate articles. Handles RSS 2.0 and Atom, lenient dates,
//! and the retention-window cut. Parsing is pure so fixtures drive the tests.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::CandidateArticle;

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    /// Filled from `<dc:date>`, rewritten to `<dcdate>` before parsing so it
    /// keys apart from a plain `<date>` sibling.
    #[serde(rename = "dcdate")]
    dc_date: Option<String>,
    date: Option<String>,
    updated: Option<String>,
    description: Option<String>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<AtomText>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
}

/// Atom text constructs carry a `type` attribute, so a plain String target
/// would reject them; `$text` takes just the content.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// The alternate (or first) link's href.
    fn href(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .and_then(|l| l.href.as_deref())
    }
}

/// Parse one feed document and keep entries published at or after `since`.
/// Entries without a usable date, title, or link are dropped.
pub fn parse_feed(feed_url: &str, xml: &str, since: DateTime<Utc>) -> Result<Vec<CandidateArticle>> {
    let clean = scrub_feed_xml(xml);
    if clean.contains("<rss") {
        parse_rss(feed_url, &clean, since)
    } else if clean.contains("<feed") {
        parse_atom(feed_url, &clean, since)
    } else {
        bail!("{feed_url}: neither an RSS nor an Atom document");
    }
}

fn parse_rss(feed_url: &str, xml: &str, since: DateTime<Utc>) -> Result<Vec<CandidateArticle>> {
    let rss: Rss = from_str(xml).with_context(|| format!("parsing rss from {feed_url}"))?;
    let label = source_label(rss.channel.title.as_deref(), feed_url);

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        // Publish date first, generic date next, "updated" last.
        let published_at = [
            it.pub_date.as_deref(),
            it.dc_date.as_deref(),
            it.date.as_deref(),
            it.updated.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(parse_date_lenient);

        let Some(published_at) = published_at else {
            continue;
        };
        if published_at < since {
            continue;
        }

        let title = clean_text(it.title.as_deref().unwrap_or_default());
        let Some(url) = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }

        out.push(CandidateArticle {
            title,
            url,
            published_at,
            summary: clean_text(it.description.as_deref().unwrap_or_default()),
            source_label: label.clone(),
        });
    }
    Ok(out)
}

fn parse_atom(feed_url: &str, xml: &str, since: DateTime<Utc>) -> Result<Vec<CandidateArticle>> {
    let feed: AtomFeed = from_str(xml).with_context(|| format!("parsing atom from {feed_url}"))?;
    let label = source_label(
        feed.title.as_ref().and_then(|t| t.value.as_deref()),
        feed_url,
    );

    let mut out = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let published_at = [entry.published.as_deref(), entry.updated.as_deref()]
            .into_iter()
            .flatten()
            .find_map(parse_date_lenient);

        let Some(published_at) = published_at else {
            continue;
        };
        if published_at < since {
            continue;
        }

        let Some(url) = entry.href().map(|h| h.trim().to_string()).filter(|h| !h.is_empty())
        else {
            continue;
        };
        let title = clean_text(
            entry
                .title
                .as_ref()
                .and_then(|t| t.value.as_deref())
                .unwrap_or_default(),
        );
        if title.is_empty() {
            continue;
        }

        out.push(CandidateArticle {
            title,
            url,
            published_at,
            summary: clean_text(
                entry
                    .summary
                    .as_ref()
                    .and_then(|s| s.value.as_deref())
                    .unwrap_or_default(),
            ),
            source_label: label.clone(),
        });
    }
    Ok(out)
}

/// Feeds publish RFC 2822 and RFC 3339 interchangeably; accept both for any
/// date field. The chrono fallback also covers obsolete zone names ("GMT").
fn parse_date_lenient(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        let unix = dt.to_offset(UtcOffset::UTC).unix_timestamp();
        return DateTime::from_timestamp(unix, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Channel/feed title when it has one, URL host otherwise.
fn source_label(channel_title: Option<&str>, feed_url: &str) -> String {
    let title = clean_text(channel_title.unwrap_or_default());
    if !title.is_empty() {
        return title;
    }
    url::Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| feed_url.to_string())
}

/// Normalize titles/summaries coming out of feed XML: decode entities,
/// strip tags, unify quotes, collapse whitespace, cap length.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Source fixups before the XML parser runs. Named HTML entities become
/// plain characters (they break deserialization), and `dc:date` loses its
/// prefix: the deserializer keys elements by local name, so a prefixed
/// `<dc:date>` would land in the `date` slot and collide with a plain
/// `<date>` sibling.
fn scrub_feed_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("<dc:date", "<dcdate")
        .replace("</dc:date>", "</dcdate>")
}
