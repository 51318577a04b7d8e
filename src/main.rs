use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use venue_extractor::app::ports::{Cache, EventStore, Fetcher, StructuredModel};
use venue_extractor::config::{Config, DEFAULT_CONFIG_PATH};
use venue_extractor::infra::http_client::ReqwestFetcher;
use venue_extractor::infra::model_client::OpenAiModel;
use venue_extractor::infra::sqlite_cache::SqliteCache;
use venue_extractor::infra::sqlite_store::SqliteEventStore;
use venue_extractor::pipeline::extractor::{ExtractionGate, ExtractorSettings, StructuredExtractor};
use venue_extractor::pipeline::orchestrator::{Orchestrator, RunOptions};
use venue_extractor::pipeline::pagination;
use venue_extractor::types::VenueExtractionSpec;
use venue_extractor::logging;

#[derive(Parser)]
#[command(name = "venue_extractor")]
#[command(about = "Discovers venue event pages and extracts structured event data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Run configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, scrape, extract and persist new events
    Run {
        /// Only run these venues (id or name, repeatable)
        #[arg(long = "venue")]
        venues: Vec<String>,
        /// Discover and report new URLs without scraping or persisting
        #[arg(long)]
        dry_run: bool,
        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_listen: Option<SocketAddr>,
    },
    /// List configured venues
    Venues,
    /// Print the listing page URLs of a venue
    Pages {
        /// Venue id or name
        venue: String,
    },
}

fn matches_venue(spec: &VenueExtractionSpec, wanted: &str) -> bool {
    spec.venue_id.to_string() == wanted
        || spec
            .name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
}

fn select_venues(all: Vec<VenueExtractionSpec>, wanted: &[String]) -> anyhow::Result<Vec<VenueExtractionSpec>> {
    if wanted.is_empty() {
        return Ok(all);
    }
    for w in wanted {
        if !all.iter().any(|spec| matches_venue(spec, w)) {
            bail!("Unknown venue: {}", w);
        }
    }
    Ok(all
        .into_iter()
        .filter(|spec| wanted.iter().any(|w| matches_venue(spec, w)))
        .collect())
}

async fn run(config: Config, venues: Vec<VenueExtractionSpec>, dry_run: bool) -> anyhow::Result<()> {
    let retry = config.retry.policy()?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new(&config.http)?);
    let cache: Arc<dyn Cache> = Arc::new(
        SqliteCache::open(&config.storage.cache_path)
            .with_context(|| format!("opening cache {}", config.storage.cache_path.display()))?,
    );
    let store: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::open(&config.storage.database_path)
            .with_context(|| format!("opening database {}", config.storage.database_path.display()))?,
    );
    let model: Arc<dyn StructuredModel> = if dry_run {
        Arc::new(OpenAiModel::new(String::new(), config.model.base_url.clone()))
    } else {
        Arc::new(OpenAiModel::from_env(config.model.base_url.clone())?)
    };

    let extractor = Arc::new(StructuredExtractor::new(
        model,
        cache.clone(),
        ExtractionGate::new(config.model.max_concurrency),
        ExtractorSettings::from_config(&config.model, retry),
    )?);
    let orchestrator = Orchestrator::new(venues, fetcher, cache, extractor, store)?;

    let report = orchestrator.run(RunOptions { dry_run }).await?;
    if dry_run {
        for venue in &report.venues {
            println!("{}:", venue.venue);
            for url in &venue.new_urls {
                println!("  {}", url);
            }
        }
    }
    println!("{}", report);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging()?;

    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;
    config.apply_env();
    let venues = config.load_venues()?;

    match cli.command {
        Commands::Run {
            venues: wanted,
            dry_run,
            metrics_listen,
        } => {
            if let Some(addr) = metrics_listen {
                venue_extractor::metrics::init_metrics(addr);
            }
            let selected = select_venues(venues, &wanted)?;
            info!(venues = selected.len(), dry_run, "Running pipeline");
            run(config, selected, dry_run).await?;
        }
        Commands::Venues => {
            for spec in &venues {
                println!(
                    "{}  {}  ({:?}, {} blocks)",
                    spec.venue_id,
                    spec.label(),
                    spec.extraction,
                    spec.blocks.len()
                );
            }
        }
        Commands::Pages { venue } => {
            let selected = select_venues(venues, &[venue])?;
            for spec in &selected {
                for url in pagination::resolve(&spec.schedule.pagination)? {
                    println!("{}", url);
                }
            }
        }
    }
    Ok(())
}
