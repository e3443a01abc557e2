use super::normalize::{domain_of, normalize_domain, normalize_title, url_key};
use crate::config::AggregatorConfig;
use crate::types::{Article, CandidateSet};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Deduplicate and rank raw hits into a bounded [`CandidateSet`].
///
/// 1. Order hits newest first (undated last), keeping arrival order on ties.
/// 2. Drop repeats of a case-normalized url; the first survivor is the
///    newest, first-seen copy.
/// 3. Drop near-duplicate titles (Sørensen–Dice over normalized titles at or
///    above `title_similarity`).
/// 4. Rank by publication time minus `domain_penalty_hours` for every earlier
///    article from the same domain, at most `max_per_domain` per domain.
/// 5. Truncate to `limit`.
///
/// No clock and no I/O, so the same input always ranks the same way, and
/// running an aggregated set through again returns it unchanged.
pub fn aggregate(
    raw_hits: impl IntoIterator<Item = Article>,
    limit: usize,
    config: &AggregatorConfig,
) -> CandidateSet {
    if limit == 0 {
        return CandidateSet::empty();
    }

    let mut hits: Vec<Article> = raw_hits.into_iter().collect();
    hits.sort_by(newest_first);

    let mut seen_urls = HashSet::new();
    hits.retain(|a| seen_urls.insert(url_key(&a.url)));

    let mut distinct: Vec<(Article, String)> = Vec::with_capacity(hits.len());
    for article in hits {
        let title = normalize_title(&article.title);
        let duplicate = !title.is_empty()
            && distinct
                .iter()
                .any(|(_, kept)| similar_titles(kept, &title, config.title_similarity));
        if !duplicate {
            distinct.push((article, title));
        }
    }

    let penalty_secs = i64::from(config.domain_penalty_hours) * 3600;
    let mut per_domain: HashMap<String, usize> = HashMap::new();
    let mut ranked: Vec<(RankKey, usize, Article)> = Vec::with_capacity(distinct.len());

    for (position, (article, _)) in distinct.into_iter().enumerate() {
        let count = per_domain.entry(domain_key(&article)).or_insert(0);
        let repeats = *count;
        *count += 1;
        if config.max_per_domain > 0 && repeats >= config.max_per_domain {
            continue;
        }
        let key = RankKey {
            dated: article.published_at.is_some(),
            effective_secs: article.published_at.map_or(0, |t| t.timestamp())
                - penalty_secs * repeats as i64,
        };
        ranked.push((key, position, article));
    }

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.truncate(limit);

    CandidateSet::from_ranked(ranked.into_iter().map(|(_, _, a)| a).collect())
}

/// Dated articles outrank undated ones; within each group, later effective
/// time wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    dated: bool,
    effective_secs: i64,
}

fn newest_first(a: &Article, b: &Article) -> Ordering {
    match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn similar_titles(a: &str, b: &str, threshold: f64) -> bool {
    a == b || strsim::sorensen_dice(a, b) >= threshold
}

fn domain_key(article: &Article) -> String {
    let domain = normalize_domain(&article.source_domain);
    if domain.is_empty() {
        domain_of(&article.url)
    } else {
        domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config() -> AggregatorConfig {
        AggregatorConfig::default()
    }

    fn article(url: &str, title: &str, hour: Option<u32>) -> Article {
        Article::new(
            url,
            title,
            format!("snippet for {title}"),
            hour.map(|h| Utc.with_ymd_and_hms(2026, 10, 1, h, 0, 0).unwrap()),
        )
    }

    #[test]
    fn empty_input_gives_empty_set() {
        assert!(aggregate(Vec::new(), 10, &config()).is_empty());
    }

    #[test]
    fn zero_limit_gives_empty_set() {
        let hits = vec![article("https://a.com/1", "One", Some(1))];
        assert!(aggregate(hits, 0, &config()).is_empty());
    }

    #[test]
    fn url_duplicates_keep_newest_copy() {
        let hits = vec![
            article("https://a.com/story", "Old copy", Some(1)),
            article("HTTPS://A.com/Story/", "New copy", Some(5)),
        ];
        let set = aggregate(hits, 10, &config());
        assert_eq!(set.len(), 1);
        assert_eq!(set.articles()[0].title, "New copy");
    }

    #[test]
    fn url_duplicates_without_dates_keep_first_seen() {
        let hits = vec![
            article("https://a.com/story", "First", None),
            article("https://a.com/story#top", "Second", None),
        ];
        let set = aggregate(hits, 10, &config());
        assert_eq!(set.len(), 1);
        assert_eq!(set.articles()[0].title, "First");
    }

    #[test]
    fn near_duplicate_titles_collapse() {
        let hits = vec![
            article("https://a.com/1", "City council approves budget", Some(2)),
            article("https://b.com/9", "City Council APPROVES budget!", Some(3)),
            article("https://c.com/4", "Storm closes schools", Some(1)),
        ];
        let set = aggregate(hits, 10, &config());
        assert_eq!(set.len(), 2);
        assert_eq!(set.articles()[0].url, "https://b.com/9");
    }

    #[test]
    fn newest_articles_rank_first_and_undated_last() {
        let hits = vec![
            article("https://a.com/1", "Alpha report", Some(1)),
            article("https://b.com/1", "Bravo analysis", None),
            article("https://c.com/1", "Charlie update", Some(9)),
        ];
        let set = aggregate(hits, 10, &config());
        let urls: Vec<_> = set.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, ["https://c.com/1", "https://a.com/1", "https://b.com/1"]);
    }

    #[test]
    fn repeated_domain_is_penalized() {
        let hits = vec![
            article("https://a.com/1", "First from a", Some(12)),
            article("https://a.com/2", "Second from a", Some(11)),
            article("https://b.com/1", "Only from b", Some(2)),
        ];
        let set = aggregate(hits, 10, &config());
        let urls: Vec<_> = set.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, ["https://a.com/1", "https://b.com/1", "https://a.com/2"]);
    }

    #[test]
    fn domain_cap_limits_single_source() {
        let titles = [
            "Tax rates rise",
            "Road works begin",
            "Parks reopen early",
            "Water main bursts",
            "Police recruit officers",
            "Schools expand meals",
        ];
        let hits: Vec<_> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| article(&format!("https://same.com/{i}"), t, Some(i as u32)))
            .collect();
        let set = aggregate(hits, 10, &config());
        assert_eq!(set.len(), config().max_per_domain);
    }

    #[test]
    fn truncates_to_limit() {
        let titles = ["Mayor", "Budget", "Transit", "Housing", "Harbor", "Library"];
        let hits: Vec<_> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| article(&format!("https://site{i}.com/a"), t, Some(i as u32)))
            .collect();
        assert_eq!(aggregate(hits, 3, &config()).len(), 3);
    }
}
