//! `etl` - runs the election and socio-economic load stages.
//!
//! The pipeline runner calls `etl elections` then `etl indicators`; a
//! non-zero exit means the stage failed and nothing was committed.
//! `etl prefetch` only warms the download cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use collector::FetchCache;
use etl::pipeline::{self, Sink};
use etl::{catalog, Config};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Loads election results and socio-economic indicators")]
struct Args {
    #[command(subcommand)]
    stage: Stage,

    /// Dry run - extract and report, don't save to database
    #[arg(long, global = true, default_value = "false")]
    dry_run: bool,

    /// Write extracted rows as CSV into this directory (implies --dry-run)
    #[arg(long, global = true)]
    export: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// First-round election results
    Elections,
    /// Socio-economic indicators
    Indicators,
    /// Elections then indicators
    All,
    /// Download every source into the cache without loading anything
    Prefetch,
}

impl Stage {
    fn runs_elections(self) -> bool {
        matches!(self, Stage::Elections | Stage::All)
    }

    fn runs_indicators(self) -> bool {
        matches!(self, Stage::Indicators | Stage::All)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let cache = FetchCache::new(&config.cache_dir).context("failed to build fetch cache")?;

    info!(
        stage = ?args.stage,
        mode = if args.dry_run || args.export.is_some() { "dry-run" } else { "live" },
        targets = config.targets.len(),
        "starting etl"
    );

    if args.stage == Stage::Prefetch {
        return prefetch(&cache).await;
    }

    if let Some(dir) = &args.export {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let dry_run = args.dry_run || args.export.is_some();

    let pool = if dry_run {
        None
    } else {
        Some(
            PgPoolOptions::new()
                .max_connections(5)
                .connect_with(config.db.connect_options()?)
                .await
                .context("failed to connect to database")?,
        )
    };
    let sink = match (&pool, &args.export) {
        (Some(pool), _) => Sink::Database(pool),
        (None, Some(dir)) => Sink::Export(dir),
        (None, None) => Sink::DryRun,
    };

    if args.stage.runs_elections() {
        let report = pipeline::run_election_stage(&config, &cache, sink)
            .await
            .context("election stage failed")?;
        info!(run_id = %report.run_id, rows = report.rows, "election stage complete");
    }

    if args.stage.runs_indicators() {
        let report = pipeline::run_indicator_stage(&config, &cache, sink)
            .await
            .context("indicator stage failed")?;
        info!(run_id = %report.run_id, rows = report.rows, "indicator stage complete");
    }

    Ok(())
}

async fn prefetch(cache: &FetchCache) -> Result<()> {
    for url in catalog::all_source_urls() {
        let path = cache
            .fetch_cached(url)
            .await
            .with_context(|| format!("failed to fetch {url}"))?;
        info!(url, path = %path.display(), "cached");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_stage_and_dry_run() {
        let args = Args::try_parse_from(["etl", "elections", "--dry-run"]).unwrap();
        assert_eq!(args.stage, Stage::Elections);
        assert!(args.dry_run);

        let args = Args::try_parse_from(["etl", "--dry-run", "all"]).unwrap();
        assert_eq!(args.stage, Stage::All);
        assert!(args.dry_run);
    }

    #[test]
    fn test_args_export_dir() {
        let args = Args::try_parse_from(["etl", "indicators", "--export", "out"]).unwrap();
        assert_eq!(args.export, Some(PathBuf::from("out")));
        assert!(!args.dry_run);
    }

    #[test]
    fn test_args_require_stage() {
        assert!(Args::try_parse_from(["etl"]).is_err());
        assert!(Args::try_parse_from(["etl", "dashboard"]).is_err());
    }

    #[test]
    fn test_stage_selection() {
        assert!(Stage::All.runs_elections() && Stage::All.runs_indicators());
        assert!(Stage::Elections.runs_elections() && !Stage::Elections.runs_indicators());
        assert!(!Stage::Indicators.runs_elections() && Stage::Indicators.runs_indicators());
        assert!(!Stage::Prefetch.runs_elections() && !Stage::Prefetch.runs_indicators());
    }
}
