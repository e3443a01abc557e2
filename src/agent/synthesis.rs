use super::Stage;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ModelClient, strip_reasoning};
use crate::retry::RetryPolicy;
use crate::types::{Article, CandidateSet, Narrative};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are a news editor. Merge the numbered articles below into one \
coherent narrative of the events. Cross-reference overlapping reports, note where sources \
disagree, and attribute claims to their source domain in parentheses. Use only the supplied \
articles. Write plain prose without headings.";

pub struct SynthesisAgent {
    model: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    max_prompt_chars: usize,
    max_tokens: u32,
}

impl SynthesisAgent {
    pub fn new(
        model: Arc<dyn ModelClient>,
        retry: RetryPolicy,
        max_prompt_chars: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            model,
            retry,
            max_prompt_chars,
            max_tokens,
        }
    }

    pub fn from_config(model: Arc<dyn ModelClient>, config: &Config) -> Self {
        Self::new(
            model,
            RetryPolicy::from_config(&config.retry, config.timeouts.synthesis()),
            config.pipeline.max_prompt_chars,
            config.pipeline.synthesis_max_tokens,
        )
    }

    pub async fn synthesize(
        &self,
        candidates: &CandidateSet,
        cancel: &CancellationToken,
    ) -> Result<Narrative> {
        if candidates.is_empty() {
            return Err(Error::SynthesisFailed("no candidate articles".into()));
        }

        let (prompt, used) = build_prompt(candidates, self.max_prompt_chars);
        if used.len() < candidates.len() {
            warn!(
                used = used.len(),
                total = candidates.len(),
                "prompt budget reached, synthesizing from top articles only"
            );
        }
        info!(model = self.model.model(), articles = used.len(), "synthesizing narrative");

        let model = self.model.as_ref();
        let raw = self
            .retry
            .run_until(
                cancel,
                "synthesis",
                || model.generate(SYSTEM_PROMPT, &prompt, self.max_tokens),
                Error::is_transient,
            )
            .await
            .map_err(|failure| {
                if failure.error.is_external() {
                    Error::SynthesisFailed(failure.to_string())
                } else {
                    failure.error
                }
            })?;

        let text = strip_reasoning(&raw);
        if text.is_empty() {
            return Err(Error::SynthesisFailed("model returned no text".into()));
        }

        Ok(Narrative {
            text,
            cited_urls: used.iter().map(|a| a.url.clone()).collect(),
        })
    }
}

#[async_trait]
impl Stage<CandidateSet> for SynthesisAgent {
    type Output = Narrative;

    async fn run(&self, input: &CandidateSet, cancel: &CancellationToken) -> Result<Narrative> {
        self.synthesize(input, cancel).await
    }
}

/// Number the articles in ranked order until `budget` characters are used.
/// The first article always goes in; no article is cut partway.
pub(crate) fn build_prompt(candidates: &CandidateSet, budget: usize) -> (String, Vec<&Article>) {
    let mut prompt = String::new();
    let mut used = Vec::new();

    for (i, article) in candidates.iter().enumerate() {
        let entry = format_entry(i + 1, article);
        if !used.is_empty() && prompt.len() + entry.len() > budget {
            break;
        }
        prompt.push_str(&entry);
        used.push(article);
    }

    (prompt, used)
}

fn format_entry(n: usize, article: &Article) -> String {
    let mut entry = String::new();
    let published = article
        .published_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown date".into());
    let _ = writeln!(entry, "[{n}] {}", article.title);
    let _ = writeln!(entry, "Source: {} | Published: {published}", article.source_domain);
    let _ = writeln!(entry, "URL: {}", article.url);
    if !article.snippet.is_empty() {
        let _ = writeln!(entry, "{}", article.snippet);
    }
    if let Some(content) = article.content.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(entry, "Article text:\n{content}");
    }
    entry.push('\n');
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregatorConfig;
    use crate::search::aggregator::aggregate;

    const TITLES: [&str; 4] = [
        "Harbor bridge reopens",
        "Mayor unveils budget",
        "Transit fares frozen",
        "Library hours expand",
    ];

    fn candidates(n: usize) -> CandidateSet {
        let hits = TITLES.iter().take(n).enumerate().map(|(i, title)| {
            Article::new(
                format!("https://site{i}.org/story"),
                *title,
                "x".repeat(200),
                None,
            )
        });
        let config = AggregatorConfig {
            max_per_domain: 0,
            ..AggregatorConfig::default()
        };
        aggregate(hits, n, &config)
    }

    #[test]
    fn prompt_includes_everything_within_budget() {
        let set = candidates(3);
        let (prompt, used) = build_prompt(&set, 100_000);
        assert_eq!(used.len(), 3);
        assert!(prompt.contains("[3] "));
        assert!(prompt.contains("unknown date"));
    }

    #[test]
    fn prompt_stops_at_budget_without_cutting() {
        let set = candidates(4);
        let one = format_entry(1, &set.articles()[0]).len();
        let (prompt, used) = build_prompt(&set, one * 2 + 10);
        assert_eq!(used.len(), 2);
        assert!(!prompt.contains("[3] "));
        assert!(prompt.ends_with("\n\n"));
    }

    #[test]
    fn fetched_article_text_counts_against_budget() {
        let plain = candidates(2);
        let budget: usize = plain.iter().enumerate().map(|(i, a)| format_entry(i + 1, a).len()).sum();
        assert_eq!(build_prompt(&plain, budget).1.len(), 2);

        let hits = TITLES.iter().take(2).enumerate().map(|(i, title)| {
            Article::new(format!("https://site{i}.org/story"), *title, "x".repeat(200), None)
                .with_content("The full story. ".repeat(40))
        });
        let config = AggregatorConfig {
            max_per_domain: 0,
            ..AggregatorConfig::default()
        };
        let enriched = aggregate(hits, 2, &config);
        let (prompt, used) = build_prompt(&enriched, budget);
        assert_eq!(used.len(), 1);
        assert!(prompt.contains("Article text:\nThe full story."));
    }

    #[test]
    fn first_article_survives_tiny_budget() {
        let set = candidates(2);
        let (_, used) = build_prompt(&set, 1);
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].url, set.articles()[0].url);
    }
}
