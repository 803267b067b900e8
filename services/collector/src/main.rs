//! Collector - warms the local download cache for public source archives
//!
//! Usage:
//!   cargo run --bin collector -- --url https://... [--url https://...]
//!   cargo run --bin collector -- --url https://... --force
//!
//! The ETL stages fetch through the same cache, so running the collector
//! first only moves network time out of the pipeline run.

use anyhow::{Context, Result};
use clap::Parser;
use collector::{FetchCache, DEFAULT_CACHE_DIR};
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Downloads source archives into the local cache")]
struct Args {
    /// URL to fetch (repeatable)
    #[arg(long, required = true)]
    url: Vec<String>,

    /// Force re-download even if cached
    #[arg(long, default_value = "false")]
    force: bool,
}

#[derive(Debug, Clone)]
struct Config {
    cache_dir: PathBuf,
    rate_limit_ms: u64,
}

impl Config {
    fn from_env() -> Self {
        Self {
            cache_dir: PathBuf::from(
                std::env::var("CACHE_DIR").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string()),
            ),
            rate_limit_ms: std::env::var("RATE_LIMIT_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    info!(cache_dir = %config.cache_dir.display(), "collector starting");

    let cache = FetchCache::new(&config.cache_dir)
        .context("Failed to build HTTP client")?
        .with_rate_limit(Duration::from_millis(config.rate_limit_ms));

    let mut collected = 0;
    let mut failed = 0;
    for url in &args.url {
        match cache.fetch(url, args.force).await {
            Ok(path) => {
                info!(url = %url, path = %path.display(), "collected");
                collected += 1;
            }
            Err(e) => {
                error!(url = %url, error = %e, "failed");
                failed += 1;
            }
        }
    }

    info!(collected, failed, "collection summary");
    if failed > 0 {
        anyhow::bail!("{} of {} URL(s) failed", failed, args.url.len());
    }
    Ok(())
}
