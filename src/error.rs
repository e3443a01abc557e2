use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{operation} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("API error ({platform}): {message}")]
    Api {
        platform: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited by {platform}")]
    RateLimit {
        platform: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("summary failed: {0}")]
    SummaryFailed(String),

    #[error("pipeline run cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    pub fn api(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn api_with_status(
        platform: impl Into<String>,
        message: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::Api {
            platform: platform.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Failures worth another attempt against a model backend: timeouts,
    /// rate limits, transport errors and overloaded/unavailable servers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimit { .. } => true,
            Self::Api {
                status_code: Some(code),
                ..
            } => matches!(code, 408 | 429) || *code >= 500,
            _ => false,
        }
    }

    /// External failures that no retry can fix (bad request, auth, invalid query).
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidQuery(_) => true,
            Self::Api {
                status_code: Some(code),
                ..
            } => (400..500).contains(code) && !matches!(code, 408 | 429),
            _ => false,
        }
    }

    /// Provider failures worth another attempt: anything a search or page
    /// fetch can declare, unless it is known to be permanent.
    pub fn is_retryable(&self) -> bool {
        self.is_external() && !self.is_permanent()
    }

    /// Errors the search provider and model backend are declared to produce.
    /// Anything else crossing an agent boundary is treated as fatal.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Timeout { .. }
                | Self::Api { .. }
                | Self::RateLimit { .. }
                | Self::Parse(_)
                | Self::InvalidQuery(_)
        )
    }

    /// Stage-level exhaustion the orchestrator knows how to handle.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            Self::SearchUnavailable(_) | Self::SynthesisFailed(_) | Self::SummaryFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
