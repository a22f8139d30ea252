//! MapScout command line shell
//!
//! Thin wrapper that loads configuration, launches the browser session and
//! prints scan results as JSON. All scanning logic lives in `crates/`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mapscout_browser::ChromiumSession;
use mapscout_core::{AppConfig, Coordinates, ListingRef, SearchQuery};
use mapscout_scanner::{HttpPlaceFetcher, InitStateParser, ScanOrchestrator, ScanOutcome};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mapscout")]
#[command(about = "Discover and extract business listings from map search")]
#[command(version)]
struct Cli {
    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a search query
    Scan {
        /// Free-text search, e.g. "bakeries in Porto"
        query: String,

        /// Interface language
        #[arg(long)]
        lang: Option<String>,

        /// Stop after this many listings
        #[arg(long)]
        max: Option<usize>,

        /// Latitude to center the search on
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude to center the search on
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Map zoom level
        #[arg(long)]
        zoom: Option<u8>,

        /// Transliterate text fields to ASCII
        #[arg(long)]
        english: bool,

        /// Only collect sponsored listings
        #[arg(long)]
        ads_only: bool,
    },

    /// Extract details for known place links
    Links {
        /// Place URLs
        #[arg(required = true)]
        links: Vec<String>,

        /// Transliterate text fields to ASCII
        #[arg(long)]
        english: bool,
    },
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mapscout=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting MapScout v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_with_env().context("failed to load configuration")?;
    if cli.headed {
        config.browser.headless = false;
    }

    let session = Arc::new(
        ChromiumSession::launch(&config.browser)
            .await
            .context("failed to launch browser")?,
    );
    let fetcher = HttpPlaceFetcher::new(&config.detail)?;
    let orchestrator = ScanOrchestrator::new(
        session.clone(),
        Arc::new(fetcher),
        Arc::new(InitStateParser::new()),
        config,
    );

    let outcome = execute(&orchestrator, cli.command).await;

    drop(orchestrator);
    if let Ok(session) = Arc::try_unwrap(session) {
        session.close().await?;
    }

    let outcome = outcome?;
    if !outcome.cacheable {
        tracing::warn!(
            had_failures = outcome.result.had_failures,
            failed_to_scroll = outcome.result.failed_to_scroll,
            "Result is incomplete"
        );
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}

async fn execute(orchestrator: &ScanOrchestrator, command: Commands) -> Result<ScanOutcome> {
    match command {
        Commands::Scan {
            query,
            lang,
            max,
            lat,
            lng,
            zoom,
            english,
            ads_only,
        } => {
            let mut query = SearchQuery::new(query)?
                .with_convert_to_english(english)
                .with_spending_on_ads(ads_only);
            if let Some(lang) = lang {
                query = query.with_lang(lang);
            }
            if let Some(max) = max {
                query = query.with_max_results(max);
            }
            if let (Some(lat), Some(lng)) = (lat, lng) {
                query = query.with_coordinates(Coordinates::new(lat, lng)?, zoom);
            }

            Ok(orchestrator.scan(&query).await?)
        }
        Commands::Links { links, english } => {
            let links = links
                .into_iter()
                .map(ListingRef::new)
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(orchestrator.scan_links(links, english).await?)
        }
    }
}
