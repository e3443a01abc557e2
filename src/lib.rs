pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod types;

/// CLI override for LLM provider/model.
pub struct LlmOverride {
    pub provider: llm::Provider,
    pub model: String,
}

impl LlmOverride {
    /// Apply the override to the default `[llm]` section. Per-stage
    /// `[models.*]` entries are left alone.
    pub fn apply(&self, llm: &mut config::LlmConfig) {
        if llm.provider != self.provider {
            llm.base_url = None;
            llm.api_key_env = None;
        }
        llm.provider = self.provider.clone();
        llm.model = self.model.clone();
    }
}
