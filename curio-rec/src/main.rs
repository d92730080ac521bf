//! curio-rec - Main entry point
//!
//! Command-line front end for title resolution, recommendations and cache
//! maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use curio_common::config::{is_valid_key, CurioConfig};
use curio_common::ContentType;
use curio_rec::db::init_database_pool;
use curio_rec::generator::CohereTitleGenerator;
use curio_rec::{cache_store, generator_client, Pipeline};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Command-line arguments for curio-rec
#[derive(Parser, Debug)]
#[command(name = "curio-rec")]
#[command(about = "Resolve, cache and rank content recommendations")]
#[command(version, long_version = LONG_VERSION)]
struct Args {
    /// Configuration file (overrides CURIO_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve titles to metadata records and print them as JSON
    Resolve {
        /// Content type: anime, movie or series
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// Generate, resolve and rank recommendations for a user
    Recommend {
        #[arg(short, long)]
        user: String,

        /// Content type: anime, movie or series
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        /// Number of results (defaults to ranking.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        query: String,
    },

    /// Run one idle-eviction pass over the metadata cache
    Evict,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CurioConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("curio_rec={level},curio_common={level}", level = config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting curio-rec {}", LONG_VERSION);
    info!("Database: {}", config.database_path.display());

    let db = init_database_pool(&config.database_path)
        .await
        .context("Failed to open database")?;
    let store = cache_store(&config.cache).context("Failed to open cache backend")?;
    let pipeline = Pipeline::from_config(&config, store, db)
        .context("Failed to build pipeline")?;

    let outcome = run(args.command, &config, &pipeline).await;

    // Let queued cache and popularity writes finish
    pipeline.background.shutdown().await;

    outcome
}

async fn run(command: Command, config: &CurioConfig, pipeline: &Pipeline) -> Result<()> {
    match command {
        Command::Resolve { content_type, titles } => {
            let outcome = pipeline.orchestrator.resolve_titles(&titles, content_type).await;
            pipeline
                .orchestrator
                .schedule_background(&outcome, content_type, &pipeline.background);
            println!("{}", serde_json::to_string_pretty(&outcome.results)?);
        }

        Command::Recommend {
            user,
            content_type,
            k,
            query,
        } => {
            let Some(key) = config.keys.cohere.clone().filter(|key| is_valid_key(key)) else {
                bail!("recommend needs a Cohere API key ([keys] cohere or CURIO_COHERE_API_KEY)");
            };
            let generator = Arc::new(CohereTitleGenerator::new(generator_client()?, key));
            let recommender = pipeline.recommender(generator);

            let results = recommender
                .recommend(&user, &query, content_type, k.unwrap_or(config.ranking.top_k))
                .await
                .context("Recommendation failed")?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Command::Evict => {
            let eviction = &pipeline.eviction;
            let report = pipeline
                .cache
                .evict_idle(
                    &eviction.prefix,
                    eviction.threshold_percent,
                    eviction.cleanup_percent,
                    eviction.max_capacity,
                )
                .await
                .context("Eviction failed")?;
            println!(
                "usage {:.2}% | keys {} | deleted {}",
                report.usage_percent, report.total_keys, report.deleted
            );
        }
    }

    Ok(())
}
