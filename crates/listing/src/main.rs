//! Trovato listing engine CLI.
//!
//! Renders a listing from a JSON fixture and a JSON request snapshot.
//!
//! Usage:
//!   trovato-listing render --fixture site.json --request request.json
//!   trovato-listing detect --request request.json

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use trovato_listing::archive::{RequestState, UserContext, detect_archive_context};
use trovato_listing::cache::SystemClock;
use trovato_listing::repository::{Fixture, InMemoryRepository};
use trovato_listing::{ListingConfig, ListingService, ListingWidget};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a listing and print it as JSON.
    Render {
        /// Site fixture: terms, items and the widget settings.
        #[arg(long)]
        fixture: PathBuf,

        /// Request snapshot.
        #[arg(long)]
        request: PathBuf,

        /// Render as an editor (bypasses the facet value cache).
        #[arg(long)]
        privileged: bool,
    },
    /// Print the archive context of a request.
    Detect {
        #[arg(long)]
        request: PathBuf,
    },
}

/// Fixture file contents.
#[derive(Debug, Deserialize)]
struct SiteFixture {
    #[serde(flatten)]
    content: Fixture,
    #[serde(default)]
    widget: ListingWidget,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    match args.command {
        Command::Render {
            fixture,
            request,
            privileged,
        } => render(&fixture, &request, privileged),
        Command::Detect { request } => {
            let state: RequestState = read_json(&request)?;
            let context = detect_archive_context(&state);
            println!("{}", serde_json::to_string_pretty(&context)?);
            Ok(())
        }
    }
}

fn render(fixture: &Path, request: &Path, privileged: bool) -> Result<()> {
    let config = ListingConfig::from_env().context("failed to load configuration")?;
    let site: SiteFixture = read_json(fixture)?;
    let mut state: RequestState = read_json(request)?;
    if privileged {
        state.user = UserContext::authenticated(Uuid::nil(), vec!["administer site".to_string()]);
    }

    info!(
        terms = site.content.terms.len(),
        items = site.content.items.len(),
        facets = site.widget.facets.len(),
        "fixture loaded"
    );

    let repository = Arc::new(InMemoryRepository::from_fixture(site.content));
    let service = ListingService::from_config(repository, config, Arc::new(SystemClock))
        .context("failed to initialize listing service")?;

    let page = service.render(&site.widget, &state);
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,trovato_listing=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
