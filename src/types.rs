use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A topic request. Fields are private so a query cannot change once a run
/// has started.
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    topic: String,
    max_results: usize,
    recency_window: Option<Duration>,
}

impl Query {
    pub fn new(topic: impl Into<String>, max_results: usize) -> Result<Self> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(Error::invalid_query("topic is empty"));
        }
        if max_results == 0 {
            return Err(Error::invalid_query("max_results must be at least 1"));
        }
        Ok(Self {
            topic,
            max_results,
            recency_window: None,
        })
    }

    pub fn with_recency_window(mut self, window: Duration) -> Self {
        self.recency_window = Some(window);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn recency_window(&self) -> Option<Duration> {
        self.recency_window
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_domain: String,
    /// Body text fetched from the article page, when enrichment is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Article {
    /// Build an article, deriving `source_domain` from the url.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let url = url.into();
        let source_domain = crate::search::normalize::domain_of(&url);
        Self {
            url,
            title: title.into(),
            snippet: snippet.into(),
            published_at,
            source_domain,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Deduplicated, ranked, size-bounded articles.
///
/// Only [`crate::search::aggregator::aggregate`] builds a non-empty set, which
/// keeps the uniqueness and size invariants in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    articles: Vec<Article>,
}

impl CandidateSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_ranked(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// Mutable access for enrichment. Callers must not touch `url`, which
    /// the uniqueness invariant is keyed on.
    pub(crate) fn articles_mut(&mut self) -> &mut [Article] {
        &mut self.articles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Article> {
        self.articles.iter()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.url == url)
    }

    pub fn into_articles(self) -> Vec<Article> {
        self.articles
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Article;
    type IntoIter = std::slice::Iter<'a, Article>;

    fn into_iter(self) -> Self::IntoIter {
        self.articles.iter()
    }
}

/// Synthesized narrative. Citations are url keys into the CandidateSet that
/// produced it; the narrative never owns article data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub text: String,
    pub cited_urls: Vec<String>,
}

impl Narrative {
    pub fn cited_articles<'a>(
        &'a self,
        candidates: &'a CandidateSet,
    ) -> impl Iterator<Item = &'a Article> + 'a {
        self.cited_urls.iter().filter_map(|url| candidates.get(url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub summary_text: String,
    pub degraded: bool,
    pub degradation_reasons: Vec<String>,
}

impl Digest {
    pub fn complete(summary_text: impl Into<String>) -> Self {
        Self {
            summary_text: summary_text.into(),
            degraded: false,
            degradation_reasons: Vec::new(),
        }
    }

    /// Record a fallback or partial result. `degraded` tracks the reasons.
    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        self.degradation_reasons.push(reason.into());
        self.degraded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_rejects_blank_topic_and_zero_results() {
        assert!(matches!(Query::new("   ", 5), Err(Error::InvalidQuery(_))));
        assert!(matches!(Query::new("elections", 0), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn query_trims_topic() {
        let q = Query::new("  local elections ", 5).unwrap();
        assert_eq!(q.topic(), "local elections");
        assert_eq!(q.max_results(), 5);
        assert!(q.recency_window().is_none());
    }

    #[test]
    fn article_derives_domain() {
        let a = Article::new("https://www.BBC.co.uk/news/1", "t", "s", None);
        assert_eq!(a.source_domain, "bbc.co.uk");
    }

    #[test]
    fn digest_degradation_follows_reasons() {
        let mut d = Digest::complete("text");
        assert!(!d.degraded);
        d.mark_degraded("synthesis: model unavailable");
        assert!(d.degraded);
        assert_eq!(d.degradation_reasons.len(), 1);
    }

    #[test]
    fn narrative_resolves_citations_against_candidates() {
        let set = CandidateSet::from_ranked(vec![
            Article::new("https://a.com/1", "A", "a", None),
            Article::new("https://b.com/1", "B", "b", None),
        ]);
        let narrative = Narrative {
            text: "x".into(),
            cited_urls: vec!["https://b.com/1".into(), "https://gone.com".into()],
        };
        let cited: Vec<_> = narrative.cited_articles(&set).collect();
        assert_eq!(cited.len(), 1);
        assert_eq!(cited[0].title, "B");
    }
}
