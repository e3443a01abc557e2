// Pipeline stages: search -> synthesis -> summary

pub mod search;
pub mod summary;
pub mod synthesis;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use search::{DroppedQuery, SearchAgent, SearchReport};
pub use summary::SummaryAgent;
pub use synthesis::SynthesisAgent;

/// One step of the pipeline: borrows its input, produces an owned output.
///
/// Agents own their retry policy and report exhaustion as a stage failure
/// (`SearchUnavailable`, `SynthesisFailed`, `SummaryFailed`). Any other
/// error is fatal to the run and must be passed through unchanged.
///
/// Once `cancel` fires a stage starts no new external call; one already in
/// flight is left to finish or time out.
#[async_trait]
pub trait Stage<I: Send + Sync + ?Sized>: Send + Sync {
    type Output: Send;

    async fn run(&self, input: &I, cancel: &CancellationToken) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Search,
    Synthesis,
    Summary,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Synthesis => "synthesis",
            Self::Summary => "summary",
        })
    }
}
