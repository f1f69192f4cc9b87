// src/classify/openai.rs
//! OpenAI-backed topic classifier. One chat-completion call per article;
//! the completion is treated as an untrusted text oracle and mined for the
//! first JSON array it contains.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{RawScore, TopicClassifier};
use crate::config::ClassifierConfig;
use crate::ingest::types::{EnrichedArticle, Topic};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chars of scraped body included in the prompt. The config cap bounds what
/// we store; this bounds what we spend tokens on.
const PROMPT_BODY_CHARS: usize = 2000;

pub struct OpenAiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    top_hint: usize,
}

impl OpenAiClassifier {
    pub fn new(
        api_key: String,
        model: Option<String>,
        timeout: Duration,
        top_hint: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("topic-newswire/0.1 (content ingestion bot)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building openai http client")?;
        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            top_hint,
        })
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            temperature: f32,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            temperature: 0.2,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;
        let resp = resp.error_for_status().context("openai status")?;
        let parsed: Resp = resp.json().await.context("openai response json")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai response had no content"))
    }
}

#[async_trait]
impl TopicClassifier for OpenAiClassifier {
    async fn score(&self, article: &EnrichedArticle, topics: &[Topic]) -> Result<Vec<RawScore>> {
        let prompt = build_prompt(article, topics, self.top_hint);
        let content = self.request_completion(&prompt).await?;
        extract_scores(&content).ok_or_else(|| anyhow!("no JSON array in classifier response"))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// The scoring prompt: the full taxonomy grouped by module, then the
/// article. The model must answer with a bare JSON array.
pub fn build_prompt(article: &EnrichedArticle, topics: &[Topic], top_hint: usize) -> String {
    let mut catalog = String::new();
    let mut sorted: Vec<&Topic> = topics.iter().collect();
    sorted.sort_by_key(|t| (t.module_id, t.topic_id));

    let mut last_module: Option<i64> = None;
    for t in sorted {
        if last_module != Some(t.module_id) {
            catalog.push_str("\nModule: ");
            catalog.push_str(&t.module_title);
            catalog.push('\n');
            last_module = Some(t.module_id);
        }
        catalog.push_str("- ");
        catalog.push_str(&t.title);
        catalog.push('\n');
    }

    let body: String = article.body_text.chars().take(PROMPT_BODY_CHARS).collect();
    format!(
        "You match news articles to course topics.\n\
         Course topics, grouped by module:\n{catalog}\n\
         Article title: {title}\n\
         Article summary: {summary}\n\
         Article text: {body}\n\n\
         Score how relevant the article is to each topic it genuinely relates to.\n\
         Reply with ONLY a JSON array of at most {top_hint} objects, best match first, \
         each shaped as {{\"title\": \"<topic title exactly as listed>\", \
         \"confidence\": <0.0-1.0>, \"reasoning\": \"<one short sentence>\"}}. \
         Reply with [] if nothing is relevant.",
        title = article.article.title,
        summary = article.article.summary,
    )
}

/// Mine a completion for its first JSON array and salvage every well-formed
/// entry. Entries without a string title and numeric confidence are skipped;
/// a missing reasoning becomes empty.
pub fn extract_scores(content: &str) -> Option<Vec<RawScore>> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end < start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&content[start..=end]).ok()?;
    let entries = value.as_array()?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(title) = entry.get("title").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(confidence) = entry.get("confidence").and_then(|v| v.as_f64()) else {
            continue;
        };
        let reasoning = entry
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        out.push(RawScore {
            title: title.to_string(),
            confidence,
            reasoning,
        });
    }
    Some(out)
}

/// Deterministic classifier for tests and offline runs: every article gets
/// the same canned entries.
pub struct MockClassifier {
    fixed: Vec<RawScore>,
}

impl MockClassifier {
    pub fn new(fixed: Vec<RawScore>) -> Self {
        Self { fixed }
    }
}

#[async_trait]
impl TopicClassifier for MockClassifier {
    async fn score(&self, _article: &EnrichedArticle, _topics: &[Topic]) -> Result<Vec<RawScore>> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build the configured classifier backend.
pub fn build_classifier(
    cfg: &ClassifierConfig,
    timeout: Duration,
    top_n: usize,
) -> Result<Arc<dyn TopicClassifier>> {
    match cfg.provider.as_str() {
        "openai" => {
            if cfg.api_key.is_empty() {
                bail!("classifier provider is \"openai\" but no api key is configured");
            }
            Ok(Arc::new(OpenAiClassifier::new(
                cfg.api_key.clone(),
                cfg.model.clone(),
                timeout,
                top_n,
            )?))
        }
        "mock" => Ok(Arc::new(MockClassifier::new(Vec::new()))),
        other => bail!("unknown classifier provider: {other}"),
    }
}
