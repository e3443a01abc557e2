use crate::agent::summary::clip_to_length;
use crate::config::Config;
use crate::error::Error;
use crate::http::HttpClient;
use crate::retry::RetryPolicy;
use crate::types::CandidateSet;
use futures::future::join_all;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Body containers, most specific first. The first one present wins.
const BODY_SELECTORS: [&str; 11] = [
    "[itemprop=\"articleBody\"]",
    "article",
    "div.article-body",
    "div.article-content",
    "div.article__body",
    "div#article-body",
    "div.story-content",
    "div.entry-content",
    "main",
    "div#main-content",
    "[role=\"main\"]",
];

/// Readable text of an article page, at most `max_chars` characters.
///
/// Takes the paragraphs of the first body container found, or the
/// container's whole text when it has no `<p>` children. `None` when the
/// page has no recognizable body.
pub fn extract_article_text(html: &str, max_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);
    let paragraph = Selector::parse("p").ok()?;

    for css in BODY_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let Some(container) = document.select(&selector).next() else {
            continue;
        };
        let paragraphs: Vec<String> = container
            .select(&paragraph)
            .map(|p| collapse(p.text()))
            .filter(|t| !t.is_empty())
            .collect();
        let text = if paragraphs.is_empty() {
            collapse(container.text())
        } else {
            paragraphs.join("\n")
        };
        if !text.is_empty() {
            return Some(clip_to_length(&text, max_chars));
        }
    }
    None
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fetches article pages for the top-ranked candidates.
pub struct ContentFetcher {
    http: HttpClient,
    retry: RetryPolicy,
    articles: usize,
    max_chars: usize,
}

impl ContentFetcher {
    pub fn new(http: HttpClient, retry: RetryPolicy, articles: usize, max_chars: usize) -> Self {
        Self {
            http,
            retry,
            articles,
            max_chars,
        }
    }

    pub fn from_config(http: HttpClient, config: &Config) -> Self {
        Self::new(
            http,
            RetryPolicy::from_config(&config.retry, config.content.timeout()),
            config.content.articles,
            config.content.max_chars,
        )
    }

    /// Attach body text to the first `articles` candidates in place and
    /// return how many got some. A page that fails or has no readable body
    /// leaves its article with the snippet only.
    pub async fn enrich(&self, candidates: &mut CandidateSet, cancel: &CancellationToken) -> usize {
        let urls: Vec<String> = candidates
            .iter()
            .take(self.articles)
            .map(|a| a.url.clone())
            .collect();
        if urls.is_empty() {
            return 0;
        }

        let pages = join_all(urls.iter().map(|url| self.fetch(url, cancel))).await;

        let mut enriched = 0;
        for (article, text) in candidates.articles_mut().iter_mut().zip(pages) {
            if let Some(text) = text {
                article.content = Some(text);
                enriched += 1;
            }
        }
        info!(requested = urls.len(), enriched, "article content fetched");
        enriched
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Option<String> {
        let http = &self.http;
        match self
            .retry
            .run_until(
                cancel,
                &format!("fetch {url}"),
                || http.get_text(url),
                Error::is_retryable,
            )
            .await
        {
            Ok(html) => {
                let text = extract_article_text(&html, self.max_chars);
                if text.is_none() {
                    debug!(url, "no readable article body");
                }
                text
            }
            Err(failure) => {
                warn!(url, error = %failure, "article fetch failed, keeping snippet");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_paragraphs_from_article_body() {
        let html = r#"
            <html><body>
              <nav><p>Home | Politics</p></nav>
              <article>
                <h1>Council results</h1>
                <p>Incumbents kept   three seats.</p>
                <p></p>
                <p>Turnout reached 41 percent.</p>
              </article>
            </body></html>
        "#;
        assert_eq!(
            extract_article_text(html, 500).as_deref(),
            Some("Incumbents kept three seats.\nTurnout reached 41 percent.")
        );
    }

    #[test]
    fn microdata_body_wins_over_generic_main() {
        let html = r#"
            <main><p>Related stories</p>
              <div itemprop="articleBody"><p>The levy passed.</p></div>
            </main>
        "#;
        assert_eq!(extract_article_text(html, 500).as_deref(), Some("The levy passed."));
    }

    #[test]
    fn container_without_paragraphs_uses_its_text() {
        let html = "<div class=\"story-content\">Polls close at eight.</div>";
        assert_eq!(
            extract_article_text(html, 500).as_deref(),
            Some("Polls close at eight.")
        );
    }

    #[test]
    fn long_body_is_clipped() {
        let body = "The count continued overnight. ".repeat(100);
        let html = format!("<article><p>{body}</p></article>");
        let text = extract_article_text(&html, 120).unwrap();
        assert!(text.chars().count() <= 120);
        assert!(text.ends_with('.'));
    }

    #[test]
    fn page_without_body_yields_nothing() {
        assert!(extract_article_text("<div>Subscribe now</div>", 500).is_none());
    }
}
