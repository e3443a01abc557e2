use super::{SearchProvider, TimeRange};
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::Article;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:8888";

/// A self-hosted SearXNG instance queried through its JSON API
/// (`format=json` must be enabled in the instance settings).
pub struct Searxng {
    http: HttpClient,
    base_url: String,
    language: String,
    safe_search: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Deserialize)]
struct RawResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
}

impl Searxng {
    pub fn new(http: HttpClient, config: &SearchConfig) -> Self {
        Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            language: config.region.clone(),
            safe_search: config.safe_search,
        }
    }
}

#[async_trait]
impl SearchProvider for Searxng {
    fn name(&self) -> &str {
        "searxng"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        recency: Option<Duration>,
    ) -> Result<Vec<Article>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_query("empty search string"));
        }

        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("categories", "news".to_string()),
            ("safesearch", if self.safe_search { "1" } else { "0" }.to_string()),
        ];
        if let Some(language) = searxng_language(&self.language) {
            params.push(("language", language));
        }
        if let Some(window) = recency {
            params.push(("time_range", time_range(TimeRange::covering(window)).to_string()));
        }

        let url = format!("{}/search", self.base_url);
        let resp: SearchResponse = self.http.get_json_with_query(&url, &params).await?;
        debug!(count = resp.results.len(), "searxng results received");

        Ok(resp
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty() && !r.title.trim().is_empty())
            .take(max_results)
            .map(|r| {
                let published = r.published_date.as_deref().and_then(parse_published);
                Article::new(
                    r.url,
                    r.title.trim(),
                    r.content.unwrap_or_default().trim(),
                    published,
                )
            })
            .collect())
    }
}

fn time_range(range: TimeRange) -> &'static str {
    match range {
        TimeRange::Day => "day",
        TimeRange::Week => "week",
        TimeRange::Month => "month",
        TimeRange::Year => "year",
    }
}

/// DuckDuckGo-style regions (`us-en`, `wt-wt`) map onto SearXNG locales.
fn searxng_language(region: &str) -> Option<String> {
    match region.split_once('-') {
        Some(("wt", _)) | None => None,
        Some((country, lang)) => Some(format!("{lang}-{}", country.to_uppercase())),
    }
}

/// SearXNG engines disagree on date formats; accept the common ones.
pub(crate) fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
