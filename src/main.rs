use anyhow::{Context, Result};
use clap::Parser;
use st_newsdesk::LlmOverride;
use st_newsdesk::agent::SearchAgent;
use st_newsdesk::config::Config;
use st_newsdesk::http::HttpClient;
use st_newsdesk::llm;
use st_newsdesk::pipeline::PipelineOrchestrator;
use st_newsdesk::search::{ContentFetcher, provider_from_config};
use st_newsdesk::types::Query;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn make_llm_override(provider: Option<String>, model: Option<String>) -> Result<Option<LlmOverride>> {
    if provider.is_none() && model.is_none() {
        return Ok(None);
    }
    let provider = match provider {
        Some(p) => p.parse::<llm::Provider>()?,
        None => llm::Provider::default(),
    };
    let model = model.unwrap_or_else(|| match &provider {
        llm::Provider::Anthropic => "claude-sonnet-4-5".into(),
        llm::Provider::OpenRouter => "meta-llama/llama-3.1-8b-instruct".into(),
        llm::Provider::OpenAi => "llama3.1:8b".into(),
    });
    Ok(Some(LlmOverride { provider, model }))
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        info!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn build_query(
    config: &Config,
    topic: String,
    max_results: Option<usize>,
    recency_hours: Option<u64>,
) -> Result<Query> {
    let mut query = Query::new(topic, max_results.unwrap_or(config.search.max_results))?;
    let window = recency_hours
        .map(|h| Duration::from_secs(h.saturating_mul(3600)))
        .or_else(|| config.pipeline.recency_window());
    if let Some(window) = window {
        query = query.with_recency_window(window);
    }
    Ok(query)
}

#[derive(Parser)]
#[command(
    name = "newsdesk",
    about = "Multi-agent news digests: web search, LLM synthesis and summarization"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the full pipeline: search -> synthesis -> summary, print the digest as JSON
    Digest {
        /// Topic to build a digest for
        #[arg(short, long)]
        topic: String,

        /// Maximum articles to keep (defaults to search.max_results)
        #[arg(long)]
        max_results: Option<usize>,

        /// Only keep articles published within this many hours
        #[arg(long)]
        recency_hours: Option<u64>,

        /// Path to config file
        #[arg(short, long, default_value = "newsdesk.toml")]
        config: PathBuf,

        /// LLM provider override: openai, openrouter, anthropic
        #[arg(long)]
        provider: Option<String>,

        /// LLM model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Run the search agent only and print the ranked candidates
    Search {
        /// Topic to search for
        #[arg(short, long)]
        topic: String,

        /// Maximum articles to keep (defaults to search.max_results)
        #[arg(long)]
        max_results: Option<usize>,

        /// Only keep articles published within this many hours
        #[arg(long)]
        recency_hours: Option<u64>,

        /// Path to config file
        #[arg(short, long, default_value = "newsdesk.toml")]
        config: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Path to config file
        #[arg(short, long, default_value = "newsdesk.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("st_newsdesk=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Digest {
            topic,
            max_results,
            recency_hours,
            config,
            provider,
            model,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(llm_override) = make_llm_override(provider, model)? {
                llm_override.apply(&mut cfg.llm);
            }
            let query = build_query(&cfg, topic, max_results, recency_hours)?;
            let orchestrator = PipelineOrchestrator::from_config(&cfg)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    on_interrupt.cancel();
                }
            });

            let digest = orchestrator.execute(query, &cancel).await.into_result()?;
            let json = serde_json::to_string_pretty(&digest)?;
            println!("{json}");
            Ok(())
        }
        Command::Search {
            topic,
            max_results,
            recency_hours,
            config,
        } => {
            let cfg = load_config(&config)?;
            let query = build_query(&cfg, topic, max_results, recency_hours)?;
            let http = HttpClient::new(&cfg.search.user_agent)?;
            let mut agent =
                SearchAgent::from_config(provider_from_config(&cfg.search, http.clone()), &cfg);
            if cfg.content.enabled {
                agent = agent.with_content(ContentFetcher::from_config(http, &cfg));
            }
            let report = agent.search(&query, &CancellationToken::new()).await?;
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
            Ok(())
        }
        Command::Config { config } => {
            let cfg = load_config(&config)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}
