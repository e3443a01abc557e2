use super::Stage;
use crate::config::{AggregatorConfig, Config};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::search::aggregator::aggregate;
use crate::search::{ContentFetcher, SearchProvider};
use crate::types::{Article, CandidateSet, Query};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_PAGE_SIZE: usize = 25;

/// Curated candidates plus the sub-queries that had to be given up on.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub candidates: CandidateSet,
    pub attempted: usize,
    pub dropped: Vec<DroppedQuery>,
}

impl SearchReport {
    pub fn is_partial(&self) -> bool {
        !self.dropped.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DroppedQuery {
    pub query: String,
    pub error: String,
    pub attempts: u32,
}

pub struct SearchAgent {
    provider: Arc<dyn SearchProvider>,
    retry: RetryPolicy,
    aggregator: AggregatorConfig,
    expand_queries: bool,
    page_size: usize,
    content: Option<ContentFetcher>,
}

impl SearchAgent {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        retry: RetryPolicy,
        aggregator: AggregatorConfig,
        expand_queries: bool,
    ) -> Self {
        Self {
            provider,
            retry,
            aggregator,
            expand_queries,
            page_size: DEFAULT_PAGE_SIZE,
            content: None,
        }
    }

    pub fn from_config(provider: Arc<dyn SearchProvider>, config: &Config) -> Self {
        Self::new(
            provider,
            RetryPolicy::from_config(&config.retry, config.timeouts.search()),
            config.aggregator.clone(),
            config.search.expand_queries,
        )
        .with_page_size(config.search.page_size)
    }

    /// Hits to request per sub-query. Never less than the query's own
    /// `max_results`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fetch article bodies for the top candidates once they are ranked.
    pub fn with_content(mut self, content: ContentFetcher) -> Self {
        self.content = Some(content);
        self
    }

    /// Fan the query out, merge the hits in sub-query order and aggregate.
    pub async fn search(&self, query: &Query, cancel: &CancellationToken) -> Result<SearchReport> {
        let now = Utc::now();
        let sub_queries = if self.expand_queries {
            expand_query(query.topic(), now)
        } else {
            vec![query.topic().to_string()]
        };
        info!(
            provider = self.provider.name(),
            topic = query.topic(),
            sub_queries = sub_queries.len(),
            "searching"
        );

        let page_size = self.page_size.max(query.max_results());
        let outcomes = join_all(
            sub_queries
                .iter()
                .map(|q| self.run_sub_query(q, page_size, query.recency_window(), cancel)),
        )
        .await;

        let mut hits = Vec::new();
        let mut dropped = Vec::new();
        for (sub_query, outcome) in sub_queries.iter().zip(outcomes) {
            match outcome {
                Ok(articles) => {
                    debug!(query = %sub_query, count = articles.len(), "sub-query returned");
                    hits.extend(articles);
                }
                Err(failure) if failure.error.is_external() => {
                    warn!(query = %sub_query, error = %failure, "dropping sub-query");
                    dropped.push(DroppedQuery {
                        query: sub_query.clone(),
                        error: failure.error.to_string(),
                        attempts: failure.attempts,
                    });
                }
                Err(failure) => return Err(failure.error),
            }
        }

        if dropped.len() == sub_queries.len() {
            let detail = dropped
                .iter()
                .map(|d| format!("{}: {}", d.query, d.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::SearchUnavailable(detail));
        }

        if let Some(window) = query.recency_window() {
            let before = hits.len();
            retain_recent(&mut hits, window, now);
            if hits.len() < before {
                debug!(discarded = before - hits.len(), "articles outside recency window");
            }
        }

        let limit = query.max_results().min(self.aggregator.max_candidates);
        let raw = hits.len();
        let mut candidates = aggregate(hits, limit, &self.aggregator);
        info!(raw, kept = candidates.len(), dropped = dropped.len(), "search complete");

        if let Some(content) = &self.content {
            content.enrich(&mut candidates, cancel).await;
        }

        Ok(SearchReport {
            candidates,
            attempted: sub_queries.len(),
            dropped,
        })
    }

    async fn run_sub_query(
        &self,
        sub_query: &str,
        page_size: usize,
        recency: Option<Duration>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<Article>, crate::retry::Failure> {
        let provider = self.provider.as_ref();
        self.retry
            .run_until(
                cancel,
                &format!("search \"{sub_query}\""),
                || provider.search(sub_query, page_size, recency),
                Error::is_retryable,
            )
            .await
    }
}

#[async_trait]
impl Stage<Query> for SearchAgent {
    type Output = SearchReport;

    async fn run(&self, input: &Query, cancel: &CancellationToken) -> Result<SearchReport> {
        self.search(input, cancel).await
    }
}

/// The topic, a news-flavoured variant and a month-stamped variant, so
/// providers that rank evergreen pages first still surface current coverage.
pub fn expand_query(topic: &str, now: DateTime<Utc>) -> Vec<String> {
    vec![
        topic.to_string(),
        format!("{topic} news"),
        format!("{topic} news {}", now.format("%Y-%m")),
    ]
}

/// Drop dated articles older than `window`; undated ones stay.
fn retain_recent(articles: &mut Vec<Article>, window: Duration, now: DateTime<Utc>) {
    let Some(cutoff) = TimeDelta::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
    else {
        return;
    };
    articles.retain(|a| a.published_at.is_none_or(|t| t >= cutoff));
}
