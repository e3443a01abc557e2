use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub models: Option<ModelsConfig>,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[default]
    DuckDuckGo,
    Searxng,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProviderKind,
    /// Endpoint override (SearXNG instance, or a DuckDuckGo mirror).
    pub base_url: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Hits requested from the provider per sub-query. Deduplication and the
    /// per-domain cap run on this wider page before the set is cut down.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Widen coverage with date-stamped variants of the topic.
    #[serde(default = "default_true")]
    pub expand_queries: bool,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub safe_search: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::default(),
            base_url: None,
            max_results: default_max_results(),
            page_size: default_page_size(),
            expand_queries: true,
            region: default_region(),
            safe_search: false,
            user_agent: default_user_agent(),
        }
    }
}

/// Fetching article pages so synthesis sees body text, not just snippets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub enabled: bool,
    /// How many of the top-ranked candidates to fetch.
    #[serde(default = "default_content_articles")]
    pub articles: usize,
    #[serde(default = "default_content_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_content_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            articles: default_content_articles(),
            max_chars: default_content_max_chars(),
            timeout_secs: default_content_timeout_secs(),
        }
    }
}

impl ContentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: crate::llm::Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: crate::llm::Provider::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: None,
            base_url: None,
        }
    }
}

/// Per-stage model configuration for the `[models]` config section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: crate::llm::Provider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Stage-specific model routing: overrides `[llm]` for one stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelsConfig {
    pub synthesis: Option<ModelConfig>,
    pub summary: Option<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Hard cap on the candidate set, whatever the query asks for.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Titles at or above this Sørensen–Dice similarity are duplicates.
    #[serde(default = "default_title_similarity")]
    pub title_similarity: f64,
    /// 0 disables the cap.
    #[serde(default = "default_max_per_domain")]
    pub max_per_domain: usize,
    #[serde(default = "default_domain_penalty_hours")]
    pub domain_penalty_hours: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            title_similarity: default_title_similarity(),
            max_per_domain: default_max_per_domain(),
            domain_penalty_hours: default_domain_penalty_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Deadline for a single external call in each stage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_search_secs")]
    pub search_secs: u64,
    #[serde(default = "default_model_secs")]
    pub synthesis_secs: u64,
    #[serde(default = "default_model_secs")]
    pub summary_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            search_secs: default_search_secs(),
            synthesis_secs: default_model_secs(),
            summary_secs: default_model_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn synthesis(&self) -> Duration {
        Duration::from_secs(self.synthesis_secs)
    }

    pub fn summary(&self) -> Duration {
        Duration::from_secs(self.summary_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Upper bound on digest length, in characters.
    #[serde(default = "default_target_length")]
    pub target_length: usize,
    pub recency_window_hours: Option<u64>,
    /// Character budget for the article listing in the synthesis prompt.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
    /// Snippets stitched together when synthesis falls back.
    #[serde(default = "default_fallback_articles")]
    pub fallback_articles: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_length: default_target_length(),
            recency_window_hours: None,
            max_prompt_chars: default_max_prompt_chars(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
            fallback_articles: default_fallback_articles(),
        }
    }
}

impl PipelineConfig {
    pub fn recency_window(&self) -> Option<Duration> {
        self.recency_window_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600)))
    }
}

// Defaults
fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    10
}
fn default_page_size() -> usize {
    25
}
fn default_content_articles() -> usize {
    3
}
fn default_content_max_chars() -> usize {
    2000
}
fn default_content_timeout_secs() -> u64 {
    10
}
fn default_region() -> String {
    "wt-wt".into()
}
fn default_user_agent() -> String {
    format!("st-newsdesk/{}", env!("CARGO_PKG_VERSION"))
}
fn default_model() -> String {
    "llama3.1:8b".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_max_candidates() -> usize {
    8
}
fn default_title_similarity() -> f64 {
    0.9
}
fn default_max_per_domain() -> usize {
    3
}
fn default_domain_penalty_hours() -> u32 {
    24
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_search_secs() -> u64 {
    20
}
fn default_model_secs() -> u64 {
    120
}
fn default_target_length() -> usize {
    1500
}
fn default_max_prompt_chars() -> usize {
    12_000
}
fn default_synthesis_max_tokens() -> u32 {
    1024
}
fn default_fallback_articles() -> usize {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.pipeline.target_length == 0 {
            return Err(Error::config("pipeline.target_length must be at least 1"));
        }
        let sim = self.aggregator.title_similarity;
        if !(sim > 0.0 && sim <= 1.0) {
            return Err(Error::config(
                "aggregator.title_similarity must be in (0, 1]",
            ));
        }
        if self.aggregator.max_candidates == 0 {
            return Err(Error::config("aggregator.max_candidates must be at least 1"));
        }
        if self.search.page_size == 0 {
            return Err(Error::config("search.page_size must be at least 1"));
        }
        if self.content.enabled && self.content.max_chars == 0 {
            return Err(Error::config("content.max_chars must be at least 1"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::config("llm.model is empty"));
        }
        Ok(())
    }
}
