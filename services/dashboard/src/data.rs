//! Reads loaded tables back from Postgres and reshapes them into the tidy
//! tables each chart draws.

use anyhow::{Context, Result};
use etl::catalog;
use etl::extract::TargetDepartments;
use etl::normalize::round6;
use etl::{ElectionResultRow, IndicatorValueRow};
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet};

pub const UNEMPLOYMENT: &str = "unemployment_rate";
pub const POVERTY: &str = "poverty_rate";

#[derive(Debug, sqlx::FromRow)]
struct StoredResult {
    year: i32,
    dept_code: String,
    dept_name: Option<String>,
    candidate_name: String,
    registered: Option<i64>,
    votes_cast: Option<i64>,
    votes_valid: Option<i64>,
    votes: Option<i64>,
    vote_share: Option<f64>,
    /// Stored `turnout_rate` indicator for the same (year, department).
    turnout_rate: Option<f64>,
}

impl From<StoredResult> for ElectionResultRow {
    fn from(row: StoredResult) -> Self {
        let turnout_rate = row.turnout_rate.or(match (row.votes_cast, row.registered) {
            (Some(cast), Some(registered)) if registered != 0 => {
                Some(round6(cast as f64 / registered as f64))
            }
            _ => None,
        });
        let dept_name = row
            .dept_name
            .or_else(|| catalog::department_name(&row.dept_code).map(str::to_string))
            .unwrap_or_default();
        Self {
            year: row.year,
            dept_code: row.dept_code,
            dept_name,
            candidate_name: row.candidate_name,
            registered: row.registered,
            votes_cast: row.votes_cast,
            votes_valid: row.votes_valid,
            votes: row.votes,
            vote_share: row.vote_share,
            turnout_rate,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoredValue {
    indicator_code: String,
    insee_code: String,
    year: i32,
    value: f64,
    source_file: Option<String>,
}

impl From<StoredValue> for IndicatorValueRow {
    fn from(row: StoredValue) -> Self {
        Self {
            indicator_code: row.indicator_code,
            insee_code: row.insee_code,
            year: row.year,
            value: row.value,
            source_file: row.source_file.unwrap_or_default(),
        }
    }
}

/// First-round results for the target departments, each carrying the
/// stored turnout indicator of its (year, department) when one exists.
pub async fn fetch_election_results(
    pool: &PgPool,
    targets: &TargetDepartments,
) -> Result<Vec<ElectionResultRow>> {
    let codes: Vec<String> = targets.iter().map(catalog::department_insee_code).collect();
    let rows: Vec<StoredResult> = sqlx::query_as(
        "SELECT EXTRACT(YEAR FROM e.election_date)::INT AS year, \
                LEFT(r.insee_code, 2) AS dept_code, \
                g.dept_name, \
                c.candidate_name, \
                r.registered, r.votes_cast, r.votes_valid, r.votes, r.vote_share, \
                tv.value AS turnout_rate \
         FROM election_result r \
         JOIN election e ON e.election_id = r.election_id \
         JOIN candidate c ON c.candidate_id = r.candidate_id \
         LEFT JOIN geo_department g ON g.dept_code = LEFT(r.insee_code, 2) \
         LEFT JOIN indicator ti ON ti.indicator_code = $2 \
         LEFT JOIN indicator_value tv ON tv.indicator_id = ti.indicator_id \
              AND tv.insee_code = r.insee_code \
              AND tv.year = EXTRACT(YEAR FROM e.election_date)::INT \
         WHERE e.election_type = 'presidentielle' AND e.round = 1 \
           AND r.insee_code = ANY($1) \
         ORDER BY year, dept_code, c.candidate_name",
    )
    .bind(&codes)
    .bind(catalog::TURNOUT_INDICATOR.indicator_code)
    .fetch_all(pool)
    .await
    .context("failed to query election results")?;

    Ok(rows.into_iter().map(ElectionResultRow::from).collect())
}

/// Socio-economic indicator values for the target departments.
pub async fn fetch_indicator_values(
    pool: &PgPool,
    targets: &TargetDepartments,
) -> Result<Vec<IndicatorValueRow>> {
    let codes: Vec<String> = targets.iter().map(catalog::department_insee_code).collect();
    let rows: Vec<StoredValue> = sqlx::query_as(
        "SELECT i.indicator_code, v.insee_code, v.year, v.value, v.source_file \
         FROM indicator_value v \
         JOIN indicator i ON i.indicator_id = v.indicator_id \
         WHERE v.insee_code = ANY($1) AND i.indicator_code <> $2 \
         ORDER BY i.indicator_code, v.insee_code, v.year",
    )
    .bind(&codes)
    .bind(catalog::TURNOUT_INDICATOR.indicator_code)
    .fetch_all(pool)
    .await
    .context("failed to query indicator values")?;

    Ok(rows.into_iter().map(IndicatorValueRow::from).collect())
}

// =============================================================================
// TIDY TABLES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TurnoutPoint {
    pub year: i32,
    pub dept_code: String,
    pub dept_name: String,
    pub turnout_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WinnerShare {
    pub year: i32,
    pub dept_code: String,
    pub candidate_name: String,
    pub share_pct: f64,
}

/// One turnout point per (year, department), first non-null wins, sorted
/// by (department, year).
pub fn turnout_series(rows: &[ElectionResultRow]) -> Vec<TurnoutPoint> {
    let mut points: BTreeMap<(&str, i32), TurnoutPoint> = BTreeMap::new();
    for row in rows {
        let Some(turnout) = row.turnout_rate else {
            continue;
        };
        points
            .entry((row.dept_code.as_str(), row.year))
            .or_insert_with(|| TurnoutPoint {
                year: row.year,
                dept_code: row.dept_code.clone(),
                dept_name: row.dept_name.clone(),
                turnout_pct: turnout * 100.0,
            });
    }
    points.into_values().collect()
}

/// Highest vote share per (year, department). Equal shares go to the
/// candidate met first.
pub fn winner_shares(rows: &[ElectionResultRow]) -> Vec<WinnerShare> {
    let mut winners: BTreeMap<(i32, &str), WinnerShare> = BTreeMap::new();
    for row in rows {
        let Some(share) = row.vote_share else {
            continue;
        };
        let candidate = WinnerShare {
            year: row.year,
            dept_code: row.dept_code.clone(),
            candidate_name: row.candidate_name.clone(),
            share_pct: share * 100.0,
        };
        winners
            .entry((row.year, row.dept_code.as_str()))
            .and_modify(|best| {
                if candidate.share_pct > best.share_pct {
                    *best = candidate.clone();
                }
            })
            .or_insert_with(|| candidate.clone());
    }
    winners.into_values().collect()
}

/// Department codes with at least one turnout point, ascending.
pub fn department_order(turnout: &[TurnoutPoint]) -> Vec<String> {
    turnout
        .iter()
        .map(|p| p.dept_code.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn dept_of(insee_code: &str) -> &str {
    insee_code.get(..2).unwrap_or(insee_code)
}

/// `(year, value)` series per department for one indicator.
pub fn indicator_series(
    values: &[IndicatorValueRow],
    indicator_code: &str,
) -> BTreeMap<String, Vec<(i32, f64)>> {
    let mut series: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
    for value in values.iter().filter(|v| v.indicator_code == indicator_code) {
        series
            .entry(dept_of(&value.insee_code).to_string())
            .or_default()
            .insert(value.year, value.value);
    }
    series
        .into_iter()
        .map(|(dept, points)| (dept, points.into_iter().collect()))
        .collect()
}

/// Values of the most recent year for one indicator, in `dept_order`.
/// `None` when the indicator has no values at all.
pub fn latest_values(
    values: &[IndicatorValueRow],
    indicator_code: &str,
    dept_order: &[String],
) -> Option<(i32, Vec<(String, f64)>)> {
    let matching: Vec<_> = values
        .iter()
        .filter(|v| v.indicator_code == indicator_code)
        .collect();
    let latest_year = matching.iter().map(|v| v.year).max()?;
    let by_dept: BTreeMap<&str, f64> = matching
        .iter()
        .filter(|v| v.year == latest_year)
        .map(|v| (dept_of(&v.insee_code), v.value))
        .collect();
    let bars = dept_order
        .iter()
        .filter_map(|dept| by_dept.get(dept.as_str()).map(|value| (dept.clone(), *value)))
        .collect();
    Some((latest_year, bars))
}
