pub mod aggregator;
pub mod content;
pub mod duckduckgo;
pub mod normalize;
pub mod searxng;

use crate::config::{SearchConfig, SearchProviderKind};
use crate::error::Result;
use crate::http::HttpClient;
use crate::types::Article;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use content::ContentFetcher;
pub use duckduckgo::DuckDuckGo;
pub use searxng::Searxng;

/// A web search backend: one query in, one page of articles out.
///
/// Implementations make a single request per call and report failures as
/// classified [`crate::error::Error`]s; retrying is the caller's job.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        recency: Option<Duration>,
    ) -> Result<Vec<Article>>;
}

pub fn provider_from_config(config: &SearchConfig, http: HttpClient) -> Arc<dyn SearchProvider> {
    match config.provider {
        SearchProviderKind::DuckDuckGo => Arc::new(DuckDuckGo::new(http, config)),
        SearchProviderKind::Searxng => Arc::new(Searxng::new(http, config)),
    }
}

/// Coarse time-range bucket for providers that take one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn covering(window: Duration) -> Self {
        const DAY: u64 = 24 * 3600;
        match window.as_secs() {
            s if s <= DAY => Self::Day,
            s if s <= 7 * DAY => Self::Week,
            s if s <= 31 * DAY => Self::Month,
            _ => Self::Year,
        }
    }
}
