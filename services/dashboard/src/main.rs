//! Dashboard - renders the static IDF elections overview from the warehouse
//!
//! Usage:
//!   cargo run --bin dashboard
//!   cargo run --bin dashboard -- --output /tmp/idf.svg

mod data;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use etl::Config;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Renders the elections dashboard as SVG")]
struct Args {
    /// Output file (defaults to DASHBOARD_OUTPUT)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let output = args.output.unwrap_or_else(|| config.dashboard_output.clone());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(config.db.connect_options()?)
        .await
        .context("failed to connect to database")?;

    let results = data::fetch_election_results(&pool, &config.targets).await?;
    let values = data::fetch_indicator_values(&pool, &config.targets).await?;
    info!(results = results.len(), values = values.len(), "loaded dashboard inputs");

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    render::render(&output, &results, &values)?;
    info!(path = %output.display(), "[done] dashboard generated");
    Ok(())
}
