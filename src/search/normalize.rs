//! Canonical keys for deduplicating search hits.

use url::Url;

/// Query parameters that identify a campaign, not a page.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ocid",
];

/// Case-normalized dedup key for an article url.
///
/// Drops the fragment, default ports, tracking parameters and a trailing
/// slash, sorts the remaining query pairs, then lower-cases the whole thing.
/// Unparseable input is only trimmed and lower-cased.
pub fn url_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    url.set_fragment(None);
    if matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = url.set_port(None);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.as_str().to_lowercase()
}

/// Lower-cased host without a leading `www.`; empty if the url has no host.
pub fn domain_of(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(normalize_domain))
        .unwrap_or_default()
}

pub fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

/// Lower-case alphanumeric words joined by single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_case_insensitive() {
        assert_eq!(
            url_key("HTTPS://News.Example.COM/Politics/Story"),
            url_key("https://news.example.com/politics/story")
        );
    }

    #[test]
    fn key_ignores_fragment_slash_and_tracking() {
        assert_eq!(
            url_key("https://example.com/story/?utm_source=x&id=7#comments"),
            url_key("https://example.com/story?id=7")
        );
    }

    #[test]
    fn key_sorts_query_pairs() {
        assert_eq!(
            url_key("https://example.com/s?b=2&a=1"),
            url_key("https://example.com/s?a=1&b=2")
        );
    }

    #[test]
    fn key_drops_default_port() {
        assert_eq!(
            url_key("https://example.com:443/a"),
            url_key("https://example.com/a")
        );
        assert_ne!(
            url_key("https://example.com:8443/a"),
            url_key("https://example.com/a")
        );
    }

    #[test]
    fn unparseable_url_is_lowercased() {
        assert_eq!(url_key("  Not A URL "), "not a url");
    }

    #[test]
    fn domain_strips_www() {
        assert_eq!(domain_of("https://WWW.Reuters.com/world"), "reuters.com");
        assert_eq!(domain_of("garbage"), "");
    }

    #[test]
    fn title_normalization() {
        assert_eq!(
            normalize_title("  Council VOTES: budget -- passed! "),
            "council votes budget passed"
        );
    }
}
