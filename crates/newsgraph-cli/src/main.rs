//! Newsgraph CLI
//!
//! Usage:
//!   newsgraph resolve [--ner-url URL]
//!   newsgraph graph --seed "Moscow" [--date-min 2024-01-01] [--date-max 2024-01-31]
//!   newsgraph refresh
//!
//! A failed resolution batch exits non-zero with nothing committed.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use newsgraph_core::{AppConfig, NewsStore};
use newsgraph_graph::{GraphQuery, GraphService};
use newsgraph_kb::KbClient;
use newsgraph_resolver::{HttpNer, ResolutionPipeline};

#[derive(Parser)]
#[command(name = "newsgraph")]
#[command(about = "News entity resolution and co-mention graph toolkit")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file; environment variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one entity resolution batch over pending documents
    Resolve {
        /// Override the NER service endpoint
        #[arg(long)]
        ner_url: Option<String>,
    },
    /// Build a co-mention graph and print it as JSON
    Graph {
        /// Seed entity name; omit for the whole co-mention universe
        #[arg(long)]
        seed: Option<String>,

        /// Window start (YYYY-MM-DD); defaults to 14 days ago
        #[arg(long)]
        date_min: Option<String>,

        /// Window end (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date_max: Option<String>,

        /// Expansion depth in hops
        #[arg(long)]
        depth: Option<u32>,

        /// Minimum supporting documents per edge
        #[arg(long)]
        min_evidence: Option<usize>,
    },
    /// Rerun the canonical display-name and kind refresh for the last batch
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.logging.level)
            }),
        )
        .init();

    match cli.command {
        Commands::Resolve { ner_url } => {
            let mut resolver_config = config.resolver.clone();
            if let Some(url) = ner_url {
                resolver_config.ner_url = url;
            }

            let store = NewsStore::connect(&config.database).await?;
            let kb = KbClient::new(config.kb.clone())?;
            let extractor = HttpNer::new(resolver_config.ner_url.clone());
            let pipeline = ResolutionPipeline::new(store, kb, resolver_config);

            let report = pipeline.run(&extractor).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Graph {
            seed,
            date_min,
            date_max,
            depth,
            min_evidence,
        } => {
            let store = NewsStore::connect(&config.database).await?;
            let service = GraphService::new(store, config.graph.clone());

            let today = Utc::now().date_naive();
            let query = GraphQuery {
                seed_name: seed.unwrap_or_default(),
                date_min: date_min
                    .unwrap_or_else(|| (today - Duration::days(14)).format("%Y-%m-%d").to_string()),
                date_max: date_max.unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
                depth,
                min_evidence,
            };

            let graph = service.build_graph(&query).await;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Refresh => {
            let store = NewsStore::connect(&config.database).await?;

            match store.latest_capture().await? {
                Some(captured_at) => {
                    let display_names = store.refresh_display_names(captured_at).await?;
                    let kinds = store.refresh_kinds(captured_at).await?;
                    println!(
                        "{}",
                        serde_json::json!({
                            "display_names_updated": display_names,
                            "kinds_updated": kinds,
                        })
                    );
                }
                None => {
                    tracing::info!("no committed batches; nothing to refresh");
                    println!(
                        "{}",
                        serde_json::json!({
                            "display_names_updated": 0,
                            "kinds_updated": 0,
                        })
                    );
                }
            }
        }
    }

    Ok(())
}
