use super::{SearchProvider, TimeRange};
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::Article;
use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// DuckDuckGo's JavaScript-free HTML endpoint.
pub struct DuckDuckGo {
    http: HttpClient,
    endpoint: String,
    region: String,
    safe_search: bool,
}

impl DuckDuckGo {
    pub fn new(http: HttpClient, config: &SearchConfig) -> Self {
        Self {
            http,
            endpoint: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            region: config.region.clone(),
            safe_search: config.safe_search,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    fn name(&self) -> &str {
        "duckduckgo"
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

        let mut form = vec![("q", query), ("kl", self.region.as_str())];
        if let Some(window) = recency {
            form.push(("df", time_filter(TimeRange::covering(window))));
        }
        if self.safe_search {
            form.push(("kp", "1"));
        }

        let (status, html) = self
            .http
            .post_form_page(
                &self.endpoint,
                &form,
                &[("Accept-Language", "en-US,en;q=0.9")],
            )
            .await?;
        debug!(status = status.as_u16(), bytes = html.len(), "duckduckgo response received");

        // Throttled clients get a 202 or a bot-check page instead of results.
        if status == StatusCode::ACCEPTED {
            return Err(throttled());
        }
        let mut articles = parse_results(&html)?;
        if articles.is_empty() && is_anomaly_page(&html) {
            return Err(throttled());
        }
        articles.truncate(max_results);
        Ok(articles)
    }
}

fn throttled() -> Error {
    Error::RateLimit {
        platform: "duckduckgo".into(),
        retry_after_secs: None,
    }
}

fn is_anomaly_page(html: &str) -> bool {
    html.contains("anomaly-modal") || html.contains("anomaly.js")
}

fn time_filter(range: TimeRange) -> &'static str {
    match range {
        TimeRange::Day => "d",
        TimeRange::Week => "w",
        TimeRange::Month => "m",
        TimeRange::Year => "y",
    }
}

/// Extract organic results from a results page, skipping ads.
pub fn parse_results(html: &str) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let result_sel = selector(".result:not(.result--ad)")?;
    let link_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut articles = Vec::new();
    for result in document.select(&result_sel) {
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let title = collapse_whitespace(&link.text().collect::<String>());
        let Some(url) = link.value().attr("href").and_then(resolve_href) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        articles.push(Article::new(url, title, snippet, None));
    }

    Ok(articles)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::parse(format!("selector {css}: {e:?}")))
}

/// Result links go through `duckduckgo.com/l/?uddg=<target>`; unwrap them.
fn resolve_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");
    if is_redirect {
        parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
    } else {
        Some(absolute)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
