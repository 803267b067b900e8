//! Stage runners invoked by the pipeline: election results, then
//! socio-economic indicators.
//!
//! Sources are fetched through the cache and processed one after the other.
//! A stage that extracts nothing fails instead of loading an empty table.

use crate::align::align_to_years;
use crate::catalog::{
    self, BALLOT_TEXT_YEAR, FIRST_ROUND_2017_BUREAU_TXT_URL, FIRST_ROUND_SHEET,
    FIRST_ROUND_XLSX_URLS, ODD_DEP_ZIP_URL, SOCIO_ECO_INDICATORS,
};
use crate::config::Config;
use crate::consolidate::consolidate;
use crate::error::Error;
use crate::extract::{ballot_text, decode_latin1, indicators, spreadsheet, TargetDepartments};
use crate::load::{self, LoadSummary};
use crate::model::{ElectionResultRow, IndicatorValueRow};
use anyhow::{Context, Result};
use collector::FetchCache;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Where a stage's rows go.
#[derive(Clone, Copy)]
pub enum Sink<'a> {
    /// Extract, consolidate and align, then only report.
    DryRun,
    /// Like `DryRun`, plus one CSV per stage in this directory.
    Export(&'a Path),
    Database(&'a PgPool),
}

pub const ELECTION_EXPORT_FILE: &str = "election_results.csv";
pub const INDICATOR_EXPORT_FILE: &str = "indicator_values.csv";

/// Write rows as CSV with a header line; missing values are empty cells.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> crate::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub run_id: Uuid,
    pub rows: usize,
    pub years: Vec<i32>,
    pub departments: Vec<String>,
    pub loaded: Option<LoadSummary>,
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// ELECTION RESULTS
// =============================================================================

/// First-round sources read by the election stage.
#[derive(Debug, Clone, Copy)]
pub struct ElectionSources<'a> {
    /// `(year, url)` of per-department workbooks.
    pub spreadsheets: &'a [(i32, &'a str)],
    /// `(year, url)` of the per-polling-station text export.
    pub ballot_text: (i32, &'a str),
}

impl ElectionSources<'static> {
    pub const CATALOG: Self = Self {
        spreadsheets: FIRST_ROUND_XLSX_URLS,
        ballot_text: (BALLOT_TEXT_YEAR, FIRST_ROUND_2017_BUREAU_TXT_URL),
    };
}

/// Extract every first-round source and consolidate them into one row per
/// (year, department, candidate).
pub async fn collect_election_results(
    cache: &FetchCache,
    sources: ElectionSources<'_>,
    targets: &TargetDepartments,
) -> Result<Vec<ElectionResultRow>> {
    let mut rows = Vec::new();

    for &(year, url) in sources.spreadsheets {
        info!(year, source = url, "[extract] spreadsheet");
        let path = cache
            .fetch_cached(url)
            .await
            .with_context(|| format!("fetching results for {year}"))?;
        let table = spreadsheet::read_sheet(&path, FIRST_ROUND_SHEET)
            .with_context(|| format!("reading {}", path.display()))?;
        let extracted = spreadsheet::extract_results(year, &table, targets)
            .with_context(|| format!("extracting results for {year}"))?;
        info!(year, rows = extracted.len(), "[extract] done");
        rows.extend(extracted);
    }

    let (year, url) = sources.ballot_text;
    info!(year, source = url, "[extract] ballot text");
    let path = cache
        .fetch_cached(url)
        .await
        .with_context(|| format!("fetching results for {year}"))?;
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let extracted = ballot_text::extract_results(year, &decode_latin1(&bytes), targets)
        .with_context(|| format!("extracting results for {year}"))?;
    info!(year, rows = extracted.len(), "[extract] done");
    rows.extend(extracted);

    Ok(consolidate(rows))
}

/// Load election results for the configured departments from the catalogue
/// sources.
pub async fn run_election_stage(
    config: &Config,
    cache: &FetchCache,
    sink: Sink<'_>,
) -> Result<StageReport> {
    run_election_stage_from(config, cache, ElectionSources::CATALOG, sink).await
}

pub async fn run_election_stage_from(
    config: &Config,
    cache: &FetchCache,
    sources: ElectionSources<'_>,
    sink: Sink<'_>,
) -> Result<StageReport> {
    let run_id = Uuid::new_v4();
    let span = info_span!("election_stage", %run_id);

    async move {
        let rows = collect_election_results(cache, sources, &config.targets).await?;
        if rows.is_empty() {
            return Err(Error::EmptyResult("no election data extracted".into()).into());
        }

        let years: Vec<i32> = rows.iter().map(|r| r.year).collect::<BTreeSet<_>>().into_iter().collect();
        let departments: Vec<String> = config.targets.iter().map(str::to_string).collect();

        let loaded = match sink {
            Sink::DryRun => {
                info!(rows = rows.len(), years = %join(&years), "[dry-run] election results not loaded");
                None
            }
            Sink::Export(dir) => {
                let path = dir.join(ELECTION_EXPORT_FILE);
                write_csv(&path, &rows).with_context(|| format!("writing {}", path.display()))?;
                info!(rows = rows.len(), path = %path.display(), "[dry-run] election results exported");
                None
            }
            Sink::Database(pool) => {
                let summary = load::load_election_results(pool, &rows, &config.targets)
                    .await
                    .context("loading election results")?;
                info!(
                    "[done] loaded election results for years {} on target departments {}",
                    join(&years),
                    join(&departments)
                );
                Some(summary)
            }
        };

        Ok::<StageReport, anyhow::Error>(StageReport {
            run_id,
            rows: rows.len(),
            years,
            departments,
            loaded,
        })
    }
    .instrument(span)
    .await
}

// =============================================================================
// SOCIO-ECONOMIC INDICATORS
// =============================================================================

/// Extract indicator values from the ODD archive, aligned to election years
/// when `align` is set.
pub async fn collect_indicator_values(
    cache: &FetchCache,
    targets: &TargetDepartments,
    align: bool,
) -> Result<Vec<IndicatorValueRow>> {
    info!(source = ODD_DEP_ZIP_URL, "[extract] insee_odd_dep");
    let path = cache
        .fetch_cached(ODD_DEP_ZIP_URL)
        .await
        .context("fetching ODD archive")?;
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let content = indicators::read_odd_table(&bytes).context("opening ODD archive")?;
    let values = indicators::extract_values(&content, SOCIO_ECO_INDICATORS, targets)
        .context("extracting socio-economic values")?;

    if align && !values.is_empty() {
        Ok(align_to_years(&values, &catalog::election_years()))
    } else {
        Ok(values)
    }
}

/// Load socio-economic indicator values for the configured departments.
pub async fn run_indicator_stage(
    config: &Config,
    cache: &FetchCache,
    sink: Sink<'_>,
) -> Result<StageReport> {
    let run_id = Uuid::new_v4();
    let span = info_span!("indicator_stage", %run_id, align = config.align_socio_to_election_years);

    async move {
        let values = collect_indicator_values(
            cache,
            &config.targets,
            config.align_socio_to_election_years,
        )
        .await?;
        if values.is_empty() {
            return Err(Error::EmptyResult("no socio-economic values extracted".into()).into());
        }

        let years: Vec<i32> = values.iter().map(|v| v.year).collect::<BTreeSet<_>>().into_iter().collect();
        let departments: Vec<String> = values
            .iter()
            .map(|v| v.insee_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let loaded = match sink {
            Sink::DryRun => {
                info!(rows = values.len(), years = %join(&years), "[dry-run] indicator values not loaded");
                None
            }
            Sink::Export(dir) => {
                let path = dir.join(INDICATOR_EXPORT_FILE);
                write_csv(&path, &values).with_context(|| format!("writing {}", path.display()))?;
                info!(rows = values.len(), path = %path.display(), "[dry-run] indicator values exported");
                None
            }
            Sink::Database(pool) => {
                let summary = load::load_indicator_values(pool, &values, &config.targets)
                    .await
                    .context("loading socio-economic values")?;
                info!(
                    "[done] loaded socio-economic indicator values for years {}-{} (rows={})",
                    years.first().copied().unwrap_or_default(),
                    years.last().copied().unwrap_or_default(),
                    values.len()
                );
                Some(summary)
            }
        };

        Ok::<StageReport, anyhow::Error>(StageReport {
            run_id,
            rows: values.len(),
            years,
            departments,
            loaded,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join(&[2007, 2012]), "2007, 2012");
        assert_eq!(join::<i32>(&[]), "");
    }

    // The cache serves pre-seeded files without touching the network.
    fn seeded_cache(name: &str) -> FetchCache {
        let dir = std::env::temp_dir().join(format!("etl-pipeline-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        FetchCache::new(dir).unwrap()
    }

    fn odd_zip(content: &str) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file(catalog::ODD_DEP_FILENAME, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_collect_indicator_values_aligned_from_cache() {
        let cache = seeded_cache("aligned");
        let content = "codgeo;variable;sous_champ;A2007;A2017\n\
                       75;taux_pvt;total;15,1;16,2\n";
        std::fs::write(cache.cache_path(ODD_DEP_ZIP_URL), odd_zip(content)).unwrap();

        let targets = TargetDepartments::new(["75"]);
        let values = collect_indicator_values(&cache, &targets, true).await.unwrap();
        let years: Vec<_> = values.iter().map(|v| (v.year, v.aligned_from())).collect();
        assert_eq!(
            years,
            vec![(2007, None), (2012, Some(2007)), (2017, None), (2022, Some(2017))]
        );

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[tokio::test]
    async fn test_collect_indicator_values_unaligned_keeps_source_years() {
        let cache = seeded_cache("raw");
        let content = "codgeo;variable;sous_champ;A2007;A2019\n\
                       75;taux_pvt;total;15,1;16,2\n";
        std::fs::write(cache.cache_path(ODD_DEP_ZIP_URL), odd_zip(content)).unwrap();

        let targets = TargetDepartments::new(["75"]);
        let values = collect_indicator_values(&cache, &targets, false).await.unwrap();
        assert_eq!(values.iter().map(|v| v.year).collect::<Vec<_>>(), vec![2007, 2019]);

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[tokio::test]
    async fn test_indicator_stage_empty_is_fatal() {
        let cache = seeded_cache("empty");
        let content = "codgeo;variable;sous_champ;A2007\n13;taux_pvt;total;15,1\n";
        std::fs::write(cache.cache_path(ODD_DEP_ZIP_URL), odd_zip(content)).unwrap();

        let config = Config::from_vars(|_| None).unwrap();
        let err = run_indicator_stage(&config, &cache, Sink::DryRun).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyResult(_))));

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    fn ballot_text(lines: &[&str]) -> Vec<u8> {
        let text = std::iter::once(
            "Code du département;Libellé du département;Code de la commune;\
             Libellé de la commune;Code du b.vote;Inscrits;Votants;Exprimés;\
             N°Panneau;Sexe;Nom;Prénom;Voix;% Voix/Ins;% Voix/Exp",
        )
        .chain(lines.iter().copied())
        .collect::<Vec<_>>()
        .join("\n");
        encoding_rs::WINDOWS_1252.encode(&text).0.into_owned()
    }

    const BALLOT_URL: &str = "https://example.org/PR17_BVot_T1_FE.txt";

    #[tokio::test]
    async fn test_election_stage_empty_is_fatal() {
        let cache = seeded_cache("elections-empty");
        let content = ballot_text(&[
            "13;Bouches-du-Rhône;055;Marseille;0001;1000;800;780;1;M;DUPONT;Jean;390;39,00;50,00",
        ]);
        std::fs::write(cache.cache_path(BALLOT_URL), content).unwrap();

        let sources = ElectionSources {
            spreadsheets: &[],
            ballot_text: (BALLOT_TEXT_YEAR, BALLOT_URL),
        };
        let config = Config::from_vars(|_| None).unwrap();
        let err = run_election_stage_from(&config, &cache, sources, Sink::DryRun)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyResult(_))));

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[tokio::test]
    async fn test_election_stage_dry_run_reports() {
        let cache = seeded_cache("elections-dry");
        let content = ballot_text(&[
            "13;Bouches-du-Rhône;055;Marseille;0001;1000;800;780;1;M;DUPONT;Jean;390;39,00;50,00",
            "75;Paris;056;Paris;0001;1000;800;780;1;M;DUPONT;Jean;390;39,00;50,00",
        ]);
        std::fs::write(cache.cache_path(BALLOT_URL), content).unwrap();

        let sources = ElectionSources {
            spreadsheets: &[],
            ballot_text: (BALLOT_TEXT_YEAR, BALLOT_URL),
        };
        let config = Config::from_vars(|_| None).unwrap();
        let report = run_election_stage_from(&config, &cache, sources, Sink::DryRun)
            .await
            .unwrap();
        assert_eq!(report.years, vec![2017]);
        assert_eq!(report.rows, 1);
        assert!(report.loaded.is_none());

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_write_csv_blank_for_missing_values() {
        let row = ElectionResultRow {
            year: 2007,
            dept_code: "75".into(),
            dept_name: "Paris".into(),
            candidate_name: "DUPONT".into(),
            registered: Some(1000),
            votes_cast: Some(800),
            votes_valid: Some(780),
            votes: None,
            vote_share: Some(0.5),
            turnout_rate: Some(0.8),
        };
        let path = std::env::temp_dir().join(format!("etl-export-{}.csv", Uuid::new_v4()));
        write_csv(&path, &[row]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("year,dept_code,dept_name,candidate_name,registered,votes_cast,votes_valid,votes,vote_share,turnout_rate")
        );
        assert_eq!(lines.next(), Some("2007,75,Paris,DUPONT,1000,800,780,,0.5,0.8"));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_indicator_stage_export_writes_csv() {
        let cache = seeded_cache("export");
        let content = "codgeo;variable;sous_champ;A2022\n75;taux_pvt;total;16,2\n";
        std::fs::write(cache.cache_path(ODD_DEP_ZIP_URL), odd_zip(content)).unwrap();

        let config = Config::from_vars(|_| None).unwrap();
        let dir = cache.dir().to_path_buf();
        run_indicator_stage(&config, &cache, Sink::Export(&dir)).await.unwrap();
        let written = std::fs::read_to_string(dir.join(INDICATOR_EXPORT_FILE)).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("poverty_rate,75000,2022,16.2,"));

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[tokio::test]
    async fn test_indicator_stage_dry_run_reports() {
        let cache = seeded_cache("dry");
        let content = "codgeo;variable;sous_champ;A2017\n\
                       75;taux_chom_bit;total;8,1\n\
                       92;taux_chom_bit;total;7,0\n";
        std::fs::write(cache.cache_path(ODD_DEP_ZIP_URL), odd_zip(content)).unwrap();

        let config = Config::from_vars(|_| None).unwrap();
        let report = run_indicator_stage(&config, &cache, Sink::DryRun).await.unwrap();
        assert_eq!(report.years, vec![2017, 2022]);
        assert_eq!(report.departments, vec!["75000", "92000"]);
        assert_eq!(report.rows, 4);
        assert!(report.loaded.is_none());

        std::fs::remove_dir_all(cache.dir()).ok();
    }
}
