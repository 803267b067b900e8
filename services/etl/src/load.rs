//! Persistence loader.
//!
//! Dimension rows (election, candidate) are find-or-create on their natural
//! key. Election results are replaced per (election, target geography set)
//! and indicator values are upserted, so every stage can be rerun in full.
//! Each stage writes inside one transaction.

use crate::catalog::{
    self, IndicatorSpec, SOCIO_ECO_INDICATORS, SOCIO_SOURCE_LABEL, TURNOUT_INDICATOR,
    TURNOUT_INDICATOR_SOURCE, TURNOUT_VALUE_SOURCE,
};
use crate::error::{Error, Result};
use crate::extract::TargetDepartments;
use crate::model::{ElectionResultRow, IndicatorValueRow};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

const ELECTION_TYPE: &str = "presidentielle";
const FIRST_ROUND: i32 = 1;
const ELECTION_SCOPE: &str = "departement";

/// Storage ids resolved during one stage.
///
/// Lives for a single transaction; a rolled-back stage must not leak ids
/// into the next run.
#[derive(Debug, Default)]
pub struct LookupCache {
    elections: HashMap<i32, i64>,
    candidates: HashMap<String, i64>,
    indicators: HashMap<String, i64>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn election(&self, year: i32) -> Option<i64> {
        self.elections.get(&year).copied()
    }

    pub fn candidate(&self, name: &str) -> Option<i64> {
        self.candidates.get(name).copied()
    }

    pub fn indicator(&self, code: &str) -> Option<i64> {
        self.indicators.get(code).copied()
    }

    fn remember_election(&mut self, year: i32, id: i64) {
        self.elections.insert(year, id);
    }

    fn remember_candidate(&mut self, name: &str, id: i64) {
        self.candidates.insert(name.to_string(), id);
    }

    fn remember_indicator(&mut self, code: &str, id: i64) {
        self.indicators.insert(code.to_string(), id);
    }
}

/// Rows written by one stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub election_results: usize,
    pub indicator_values: usize,
}

// =============================================================================
// PAYLOAD BUILDERS
// =============================================================================

/// Department-level INSEE codes of the target set, in code order.
pub fn target_insee_codes(targets: &TargetDepartments) -> Vec<String> {
    targets.iter().map(catalog::department_insee_code).collect()
}

/// Geography written for one target department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentGeo {
    pub dept_code: String,
    pub dept_name: String,
    /// False when the name is only the code; such rows never overwrite a
    /// stored name.
    pub name_known: bool,
}

impl DepartmentGeo {
    pub fn insee_code(&self) -> String {
        catalog::department_insee_code(&self.dept_code)
    }

    pub fn commune_name(&self) -> String {
        format!("{} (departement)", self.dept_name)
    }
}

/// One geography row per target department.
///
/// The name comes from the first extracted row carrying one, then from the
/// catalogue, then falls back to the code itself, so every target has a row
/// for the fact tables to reference.
pub fn department_geography(
    targets: &TargetDepartments,
    rows: &[ElectionResultRow],
) -> Vec<DepartmentGeo> {
    targets
        .iter()
        .map(|code| {
            let extracted = rows
                .iter()
                .find(|r| r.dept_code == code && !r.dept_name.trim().is_empty())
                .map(|r| r.dept_name.trim().to_string());
            let name = extracted.or_else(|| catalog::department_name(code).map(str::to_string));
            DepartmentGeo {
                dept_code: code.to_string(),
                name_known: name.is_some(),
                dept_name: name.unwrap_or_else(|| code.to_string()),
            }
        })
        .collect()
}

/// Every indicator the catalogue defines, with its storage `source` label.
pub fn indicator_catalog_rows() -> Vec<(&'static IndicatorSpec, &'static str)> {
    SOCIO_ECO_INDICATORS
        .iter()
        .map(|spec| (spec, SOCIO_SOURCE_LABEL))
        .chain(std::iter::once((&TURNOUT_INDICATOR, TURNOUT_INDICATOR_SOURCE)))
        .collect()
}

/// Results grouped by year, ascending.
pub fn results_by_year(rows: &[ElectionResultRow]) -> BTreeMap<i32, Vec<&ElectionResultRow>> {
    let mut by_year: BTreeMap<i32, Vec<&ElectionResultRow>> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.year).or_default().push(row);
    }
    by_year
}

/// Turnout indicator values: the first non-null turnout per
/// (year, department), in input order.
pub fn turnout_values(rows: &[ElectionResultRow]) -> Vec<IndicatorValueRow> {
    let mut seen = BTreeSet::new();
    let mut values = Vec::new();
    for row in rows {
        let Some(turnout) = row.turnout_rate else {
            continue;
        };
        if !seen.insert((row.year, row.dept_code.as_str())) {
            continue;
        }
        values.push(IndicatorValueRow {
            indicator_code: TURNOUT_INDICATOR.indicator_code.to_string(),
            insee_code: catalog::department_insee_code(&row.dept_code),
            year: row.year,
            value: turnout,
            source_file: TURNOUT_VALUE_SOURCE.to_string(),
        });
    }
    values
}

fn distinct_departments<'a>(rows: impl IntoIterator<Item = &'a ElectionResultRow>) -> usize {
    rows.into_iter()
        .map(|r| r.dept_code.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

// =============================================================================
// DIMENSIONS
// =============================================================================

/// Older schemas declared `election_result.votes` NOT NULL; share-only
/// sheets need it nullable.
async fn ensure_votes_nullable(conn: &mut PgConnection) -> Result<()> {
    let nullable: Option<(String,)> = sqlx::query_as(
        "SELECT is_nullable FROM information_schema.columns \
         WHERE table_name = 'election_result' AND column_name = 'votes'",
    )
    .fetch_optional(&mut *conn)
    .await?;

    if matches!(nullable, Some((ref flag,)) if flag == "NO") {
        sqlx::query("ALTER TABLE election_result ALTER COLUMN votes DROP NOT NULL")
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn ensure_geography(
    conn: &mut PgConnection,
    targets: &TargetDepartments,
    rows: &[ElectionResultRow],
) -> Result<()> {
    for geo in department_geography(targets, rows) {
        let on_conflict = if geo.name_known {
            "DO UPDATE SET dept_name = EXCLUDED.dept_name"
        } else {
            "DO NOTHING"
        };
        sqlx::query(&format!(
            "INSERT INTO geo_department (dept_code, dept_name) VALUES ($1, $2) \
             ON CONFLICT (dept_code) {on_conflict}"
        ))
        .bind(&geo.dept_code)
        .bind(&geo.dept_name)
        .execute(&mut *conn)
        .await?;

        let on_conflict = if geo.name_known {
            "DO UPDATE SET commune_name = EXCLUDED.commune_name"
        } else {
            "DO NOTHING"
        };
        sqlx::query(&format!(
            "INSERT INTO geo_commune (insee_code, commune_name, dept_code) VALUES ($1, $2, $3) \
             ON CONFLICT (insee_code) {on_conflict}"
        ))
        .bind(geo.insee_code())
        .bind(geo.commune_name())
        .bind(&geo.dept_code)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn ensure_indicator_catalog(conn: &mut PgConnection) -> Result<()> {
    for (spec, source) in indicator_catalog_rows() {
        sqlx::query(
            "INSERT INTO indicator (indicator_code, indicator_name, unit, source) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (indicator_code) DO NOTHING",
        )
        .bind(spec.indicator_code)
        .bind(spec.indicator_name)
        .bind(spec.unit)
        .bind(source)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Get or create the first-round election of `year`.
async fn get_or_create_election(
    conn: &mut PgConnection,
    cache: &mut LookupCache,
    year: i32,
) -> Result<i64> {
    if let Some(id) = cache.election(year) {
        return Ok(id);
    }
    let date = catalog::election_date(year).ok_or(Error::UnknownElectionYear(year))?;

    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT election_id FROM election \
         WHERE election_type = $1 AND election_date = $2 AND round = $3 AND scope = $4",
    )
    .bind(ELECTION_TYPE)
    .bind(date)
    .bind(FIRST_ROUND)
    .bind(ELECTION_SCOPE)
    .fetch_optional(&mut *conn)
    .await?;

    let id = match existing {
        Some((id,)) => id,
        None => {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO election (election_type, election_date, round, scope) \
                 VALUES ($1, $2, $3, $4) RETURNING election_id",
            )
            .bind(ELECTION_TYPE)
            .bind(date)
            .bind(FIRST_ROUND)
            .bind(ELECTION_SCOPE)
            .fetch_one(&mut *conn)
            .await?;
            id
        }
    };

    cache.remember_election(year, id);
    Ok(id)
}

/// Get or create a candidate keyed by (name, no party).
async fn get_or_create_candidate(
    conn: &mut PgConnection,
    cache: &mut LookupCache,
    name: &str,
) -> Result<i64> {
    if let Some(id) = cache.candidate(name) {
        return Ok(id);
    }

    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT candidate_id FROM candidate \
         WHERE candidate_name = $1 AND party_code IS NOT DISTINCT FROM $2",
    )
    .bind(name)
    .bind(None::<String>)
    .fetch_optional(&mut *conn)
    .await?;

    let id = match existing {
        Some((id,)) => id,
        None => {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO candidate (candidate_name, party_code) VALUES ($1, $2) \
                 RETURNING candidate_id",
            )
            .bind(name)
            .bind(None::<String>)
            .fetch_one(&mut *conn)
            .await?;
            id
        }
    };

    cache.remember_candidate(name, id);
    Ok(id)
}

async fn resolve_indicators(
    conn: &mut PgConnection,
    cache: &mut LookupCache,
    values: &[IndicatorValueRow],
) -> Result<()> {
    let codes: Vec<String> = values
        .iter()
        .map(|v| v.indicator_code.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|code| cache.indicator(code).is_none())
        .collect();
    if codes.is_empty() {
        return Ok(());
    }

    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT indicator_id, indicator_code FROM indicator WHERE indicator_code = ANY($1)",
    )
    .bind(&codes)
    .fetch_all(&mut *conn)
    .await?;

    for (id, code) in rows {
        cache.remember_indicator(&code, id);
    }
    Ok(())
}

// =============================================================================
// FACTS
// =============================================================================

/// Upsert indicator values; rows whose indicator is not catalogued are
/// skipped.
async fn upsert_indicator_values(
    conn: &mut PgConnection,
    cache: &mut LookupCache,
    values: &[IndicatorValueRow],
) -> Result<usize> {
    resolve_indicators(conn, cache, values).await?;

    let mut written = 0;
    for value in values {
        let Some(indicator_id) = cache.indicator(&value.indicator_code) else {
            continue;
        };
        sqlx::query(
            "INSERT INTO indicator_value (indicator_id, insee_code, year, value, source_file) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (indicator_id, insee_code, year) DO UPDATE \
             SET value = EXCLUDED.value, source_file = EXCLUDED.source_file",
        )
        .bind(indicator_id)
        .bind(&value.insee_code)
        .bind(value.year)
        .bind(value.value)
        .bind(&value.source_file)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn replace_election_results(
    conn: &mut PgConnection,
    cache: &mut LookupCache,
    year: i32,
    rows: &[&ElectionResultRow],
    target_insee: &[String],
) -> Result<usize> {
    let election_id = get_or_create_election(conn, cache, year).await?;

    sqlx::query("DELETE FROM election_result WHERE election_id = $1 AND insee_code = ANY($2)")
        .bind(election_id)
        .bind(target_insee)
        .execute(&mut *conn)
        .await?;

    for row in rows {
        let candidate_id = get_or_create_candidate(conn, cache, &row.candidate_name).await?;
        sqlx::query(
            "INSERT INTO election_result \
             (election_id, insee_code, candidate_id, registered, votes_cast, votes_valid, votes, vote_share) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(election_id)
        .bind(catalog::department_insee_code(&row.dept_code))
        .bind(candidate_id)
        .bind(row.registered)
        .bind(row.votes_cast)
        .bind(row.votes_valid)
        .bind(row.votes)
        .bind(row.vote_share)
        .execute(&mut *conn)
        .await?;
    }
    Ok(rows.len())
}

// =============================================================================
// STAGES
// =============================================================================

/// Load consolidated election results plus the derived turnout indicator.
pub async fn load_election_results(
    pool: &PgPool,
    rows: &[ElectionResultRow],
    targets: &TargetDepartments,
) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    if rows.is_empty() {
        warn!("no election rows to load");
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;
    let mut cache = LookupCache::new();

    ensure_votes_nullable(&mut tx).await?;
    ensure_geography(&mut tx, targets, rows).await?;
    ensure_indicator_catalog(&mut tx).await?;

    let target_insee = target_insee_codes(targets);
    for (year, year_rows) in results_by_year(rows) {
        let written =
            replace_election_results(&mut tx, &mut cache, year, &year_rows, &target_insee).await?;
        info!(
            year,
            rows = written,
            departments = distinct_departments(year_rows.iter().copied()),
            "[load] election results"
        );
        summary.election_results += written;
    }

    summary.indicator_values =
        upsert_indicator_values(&mut tx, &mut cache, &turnout_values(rows)).await?;

    tx.commit().await?;
    Ok(summary)
}

/// Load socio-economic indicator values.
pub async fn load_indicator_values(
    pool: &PgPool,
    values: &[IndicatorValueRow],
    targets: &TargetDepartments,
) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    if values.is_empty() {
        warn!("no socio-economic values to load");
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;
    let mut cache = LookupCache::new();

    ensure_geography(&mut tx, targets, &[]).await?;
    ensure_indicator_catalog(&mut tx).await?;
    summary.indicator_values = upsert_indicator_values(&mut tx, &mut cache, values).await?;

    if summary.indicator_values == 0 {
        warn!("socio-economic payload is empty after indicator lookup");
    } else {
        let indicators: BTreeSet<_> = values.iter().map(|v| v.indicator_code.as_str()).collect();
        let geographies: BTreeSet<_> = values.iter().map(|v| v.insee_code.as_str()).collect();
        info!(
            rows = summary.indicator_values,
            indicators = indicators.len(),
            departments = geographies.len(),
            "[load] socio indicators"
        );
    }

    tx.commit().await?;
    Ok(summary)
}

// =============================================================================
// TESTS
// =============================================================================
