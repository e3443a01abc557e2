use crate::agent::summary::clip_to_length;
use crate::types::{CandidateSet, Digest, Narrative};

/// Stand-in narrative when synthesis is unavailable: the top `count`
/// snippets, each tagged with its domain. Cites exactly those articles.
pub fn fallback_narrative(candidates: &CandidateSet, count: usize) -> Narrative {
    let used: Vec<_> = candidates.iter().take(count.max(1)).collect();
    let text = used
        .iter()
        .map(|a| {
            let body = if a.snippet.is_empty() {
                a.title.as_str()
            } else {
                a.snippet.as_str()
            };
            format!("{} ({}): {}", a.title, a.source_domain, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Narrative {
        text,
        cited_urls: used.iter().map(|a| a.url.clone()).collect(),
    }
}

/// Stand-in digest when summarization is unavailable.
pub fn fallback_digest(narrative: &Narrative, target_length: usize) -> Digest {
    Digest::complete(clip_to_length(&narrative.text, target_length))
}
