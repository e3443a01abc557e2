use super::Stage;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ModelClient, strip_reasoning};
use crate::retry::RetryPolicy;
use crate::types::{Digest, Narrative};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SummaryAgent {
    model: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    target_length: usize,
}

impl SummaryAgent {
    pub fn new(model: Arc<dyn ModelClient>, retry: RetryPolicy, target_length: usize) -> Self {
        Self {
            model,
            retry,
            target_length,
        }
    }

    pub fn from_config(model: Arc<dyn ModelClient>, config: &Config) -> Self {
        Self::new(
            model,
            RetryPolicy::from_config(&config.retry, config.timeouts.summary()),
            config.pipeline.target_length,
        )
    }

    /// Condense `narrative` into at most `target_length` characters.
    pub async fn summarize(
        &self,
        narrative: &Narrative,
        target_length: usize,
        cancel: &CancellationToken,
    ) -> Result<Digest> {
        if narrative.text.trim().is_empty() {
            return Err(Error::SummaryFailed("narrative is empty".into()));
        }

        let system = format!(
            "You write news digests. Summarize the narrative in at most {target_length} \
             characters. Keep the most important developments and their sources. Do not add \
             any fact that is not in the narrative."
        );
        info!(model = self.model.model(), target_length, "summarizing narrative");

        let model = self.model.as_ref();
        let max_tokens = token_budget(target_length);
        let raw = self
            .retry
            .run_until(
                cancel,
                "summary",
                || model.generate(&system, &narrative.text, max_tokens),
                Error::is_transient,
            )
            .await
            .map_err(|failure| {
                if failure.error.is_external() {
                    Error::SummaryFailed(failure.to_string())
                } else {
                    failure.error
                }
            })?;

        let text = strip_reasoning(&raw);
        if text.is_empty() {
            return Err(Error::SummaryFailed("model returned no text".into()));
        }

        let len = text.chars().count();
        if len > target_length {
            debug!(len, target_length, "clipping summary");
        }
        Ok(Digest::complete(clip_to_length(&text, target_length)))
    }
}

#[async_trait]
impl Stage<Narrative> for SummaryAgent {
    type Output = Digest;

    async fn run(&self, input: &Narrative, cancel: &CancellationToken) -> Result<Digest> {
        self.summarize(input, self.target_length, cancel).await
    }
}

/// Roughly four characters per token, with headroom for the model's own
/// formatting.
fn token_budget(target_length: usize) -> u32 {
    u32::try_from(target_length / 2)
        .unwrap_or(u32::MAX)
        .max(128)
}

/// Shorten `text` to at most `max_chars` characters, preferring to end on a
/// sentence, then on a word. Text already within the bound is only trimmed.
pub fn clip_to_length(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];

    let sentence_end = head
        .char_indices()
        .filter(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = sentence_end.filter(|&end| end >= cut / 2) {
        return head[..end].to_string();
    }

    match head.rfind(char::is_whitespace) {
        Some(i) if i > 0 => head[..i].trim_end().to_string(),
        _ => head.to_string(),
    }
}
