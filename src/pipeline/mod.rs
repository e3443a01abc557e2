pub mod fallback;

use crate::agent::{SearchAgent, SearchReport, Stage, StageKind, SummaryAgent, SynthesisAgent};
use crate::config::{Config, PipelineConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::llm::{ModelRouter, TaskKind};
use crate::search::{ContentFetcher, SearchProvider, provider_from_config};
use crate::types::{CandidateSet, Digest, Narrative, Query};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Pending,
    Searching,
    Synthesizing,
    Summarizing,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn can_advance_to(self, next: Self) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Pending, Searching)
                | (Searching, Synthesizing)
                | (Synthesizing, Summarizing)
                | (Summarizing, Completed)
        ) || (next == Failed && !self.is_terminal())
    }

    fn stage(self) -> Option<StageKind> {
        match self {
            Self::Searching => Some(StageKind::Search),
            Self::Synthesizing => Some(StageKind::Synthesis),
            Self::Summarizing => Some(StageKind::Summary),
            _ => None,
        }
    }
}

/// Everything one submission produced, including the stages that fell back.
#[derive(Debug)]
pub struct PipelineRun {
    pub query: Query,
    state: PipelineState,
    history: Vec<PipelineState>,
    pub candidates: CandidateSet,
    pub narrative: Option<Narrative>,
    pub digest: Option<Digest>,
    /// Stage failures: the ones the run fell back from, and a search
    /// failure that ended it.
    pub stage_errors: BTreeMap<StageKind, Error>,
    failed_stage: Option<StageKind>,
    error: Option<Error>,
}

impl PipelineRun {
    fn new(query: Query) -> Self {
        Self {
            query,
            state: PipelineState::Pending,
            history: vec![PipelineState::Pending],
            candidates: CandidateSet::empty(),
            narrative: None,
            digest: None,
            stage_errors: BTreeMap::new(),
            failed_stage: None,
            error: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn failed_stage(&self) -> Option<StageKind> {
        self.failed_stage
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The digest of a completed run, or the error that ended it.
    pub fn into_result(self) -> Result<Digest> {
        match (self.state, self.digest, self.error) {
            (PipelineState::Completed, Some(digest), _) => Ok(digest),
            (_, _, Some(error)) => Err(error),
            (state, _, None) => Err(Error::internal(format!(
                "run ended in state {state:?} without a digest"
            ))),
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::internal(format!(
                "illegal pipeline transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a search failure against the stage and hand it back for
    /// the run to end on.
    fn search_unavailable(&mut self, msg: String) -> Error {
        self.stage_errors
            .insert(StageKind::Search, Error::SearchUnavailable(msg.clone()));
        Error::SearchUnavailable(msg)
    }

    fn fail(&mut self, error: Error) {
        self.failed_stage = self.state.stage();
        self.error = Some(error);
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
    }
}

/// Runs search, synthesis and summary in order and applies the fallback
/// table when a stage gives up.
///
/// | failure                   | outcome                                   |
/// |---------------------------|-------------------------------------------|
/// | search unavailable        | run fails, kept in `stage_errors`         |
/// | no candidates             | run fails, kept in `stage_errors`         |
/// | some sub-queries dropped  | continue, digest degraded (`search:`)     |
/// | synthesis failed          | snippet narrative, degraded (`synthesis:`)|
/// | summary failed            | clipped narrative, degraded (`summary:`)  |
/// | cancelled / anything else | run fails, error passed through           |
pub struct PipelineOrchestrator<S = SearchAgent, Y = SynthesisAgent, M = SummaryAgent> {
    search: S,
    synthesis: Y,
    summary: M,
    target_length: usize,
    fallback_articles: usize,
}

impl PipelineOrchestrator {
    /// Wire real HTTP-backed agents from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::new(&config.search.user_agent)?;
        let router = ModelRouter::from_config(&config.llm, config.models.as_ref())?;
        let provider = provider_from_config(&config.search, http.clone());
        let mut search = SearchAgent::from_config(provider, config);
        if config.content.enabled {
            search = search.with_content(ContentFetcher::from_config(http, config));
        }
        Ok(Self::new(
            search,
            SynthesisAgent::from_config(router.client_for(TaskKind::Synthesis), config),
            SummaryAgent::from_config(router.client_for(TaskKind::Summary), config),
            &config.pipeline,
        ))
    }

    /// Wire agents around an existing provider and model router.
    pub fn from_parts(
        provider: Arc<dyn SearchProvider>,
        router: &ModelRouter,
        config: &Config,
    ) -> Self {
        Self::new(
            SearchAgent::from_config(provider, config),
            SynthesisAgent::from_config(router.client_for(TaskKind::Synthesis), config),
            SummaryAgent::from_config(router.client_for(TaskKind::Summary), config),
            &config.pipeline,
        )
    }
}

impl<S, Y, M> PipelineOrchestrator<S, Y, M>
where
    S: Stage<Query, Output = SearchReport>,
    Y: Stage<CandidateSet, Output = Narrative>,
    M: Stage<Narrative, Output = Digest>,
{
    pub fn new(search: S, synthesis: Y, summary: M, config: &PipelineConfig) -> Self {
        Self {
            search,
            synthesis,
            summary,
            target_length: config.target_length,
            fallback_articles: config.fallback_articles,
        }
    }

    /// Run the full pipeline for `query`. Nothing is cached between calls.
    pub async fn submit(&self, query: Query) -> Result<Digest> {
        self.execute(query, &CancellationToken::new())
            .await
            .into_result()
    }

    /// Run the pipeline and hand back the whole run record.
    pub async fn execute(&self, query: Query, cancel: &CancellationToken) -> PipelineRun {
        let mut run = PipelineRun::new(query);
        if let Err(e) = self.drive(&mut run, cancel).await {
            match &e {
                Error::Cancelled => warn!(state = ?run.state, "pipeline run cancelled"),
                e if e.is_stage_failure() => {
                    warn!(state = ?run.state, error = %e, "pipeline run failed")
                }
                e => error!(state = ?run.state, error = %e, "pipeline run aborted"),
            }
            run.fail(e);
        }
        run
    }

    async fn drive(&self, run: &mut PipelineRun, cancel: &CancellationToken) -> Result<()> {
        let mut reasons = Vec::new();

        run.advance(PipelineState::Searching)?;
        let outcome = guarded(cancel, self.search.run(&run.query, cancel)).await;
        let report = match outcome {
            Ok(report) => report,
            Err(Error::SearchUnavailable(msg)) => return Err(run.search_unavailable(msg)),
            Err(e) => return Err(e),
        };
        if report.candidates.is_empty() {
            let msg = format!("no articles found for \"{}\"", run.query.topic());
            return Err(run.search_unavailable(msg));
        }
        if report.is_partial() {
            let queries = report
                .dropped
                .iter()
                .map(|d| d.query.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            reasons.push(format!(
                "search: {} of {} sub-queries failed ({queries})",
                report.dropped.len(),
                report.attempted
            ));
        }
        info!(candidates = report.candidates.len(), "search stage done");
        run.candidates = report.candidates;

        run.advance(PipelineState::Synthesizing)?;
        let narrative = match guarded(cancel, self.synthesis.run(&run.candidates, cancel)).await {
            Ok(narrative) => narrative,
            Err(Error::SynthesisFailed(msg)) => {
                warn!(error = %msg, "synthesis failed, falling back to snippets");
                let narrative =
                    fallback::fallback_narrative(&run.candidates, self.fallback_articles);
                reasons.push(format!(
                    "synthesis: {msg}; used top {} article snippets",
                    narrative.cited_urls.len()
                ));
                run.stage_errors
                    .insert(StageKind::Synthesis, Error::SynthesisFailed(msg));
                narrative
            }
            Err(e) => return Err(e),
        };
        info!(cited = narrative.cited_urls.len(), "synthesis stage done");

        run.advance(PipelineState::Summarizing)?;
        let narrative = &*run.narrative.insert(narrative);
        let mut digest = match guarded(cancel, self.summary.run(narrative, cancel)).await {
            Ok(digest) => digest,
            Err(Error::SummaryFailed(msg)) => {
                warn!(error = %msg, "summary failed, falling back to clipped narrative");
                reasons.push(format!("summary: {msg}; used clipped narrative"));
                run.stage_errors
                    .insert(StageKind::Summary, Error::SummaryFailed(msg));
                fallback::fallback_digest(narrative, self.target_length)
            }
            Err(e) => return Err(e),
        };

        for reason in reasons {
            digest.mark_degraded(reason);
        }
        info!(
            chars = digest.summary_text.chars().count(),
            degraded = digest.degraded,
            "summary stage done"
        );
        run.digest = Some(digest);
        run.advance(PipelineState::Completed)
    }
}

/// Check the token at the stage boundary, then let the stage run. The
/// stage stops issuing calls once cancelled but is not aborted mid-call;
/// whatever it returns after the token fires is discarded.
async fn guarded<T>(cancel: &CancellationToken, stage: impl Future<Output = Result<T>>) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let out = stage.await;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    out
}
