//! Polling-station level first-round file (semicolon separated, Latin-1).
//!
//! Each line is one polling station; candidate results follow as repeated
//! groups of seven columns starting at the `N°Panneau` column:
//! panel, sex, last name, first name, votes, % of registered, % of valid.
//! Results are aggregated per department.

use crate::catalog::department_name;
use crate::error::{Error, Result};
use crate::extract::TargetDepartments;
use crate::model::ElectionResultRow;
use crate::normalize::{canonical_candidate_name, normalize_dept_code, normalize_key, round6, to_int};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Normalized header names that must be present.
const REQUIRED_COLUMNS: &[&str] = &[
    "codedudepartement",
    "libelledudepartement",
    "codedelacommune",
    "codedubvote",
    "inscrits",
    "votants",
    "exprimes",
    "npanneau",
];

const CHUNK_SIZE: usize = 7;
const NAME_OFFSET: usize = 2;
const VOTES_OFFSET: usize = 4;

#[derive(Debug, Default)]
struct DepartmentTotals {
    dept_name: String,
    registered: i64,
    votes_cast: i64,
    votes_valid: i64,
}

/// Resolved positions of the required columns.
struct Layout {
    dept_code: usize,
    dept_name: usize,
    commune: usize,
    bureau: usize,
    registered: usize,
    votes_cast: usize,
    votes_valid: usize,
    candidate_start: usize,
}

impl Layout {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let idx_by_name: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (normalize_key(name), idx))
            .collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| !idx_by_name.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Format {
                origin: "ballot-level text".to_string(),
                missing,
            });
        }
        let idx = |name: &str| idx_by_name[name];
        Ok(Self {
            dept_code: idx("codedudepartement"),
            dept_name: idx("libelledudepartement"),
            commune: idx("codedelacommune"),
            bureau: idx("codedubvote"),
            registered: idx("inscrits"),
            votes_cast: idx("votants"),
            votes_valid: idx("exprimes"),
            candidate_start: idx("npanneau"),
        })
    }
}

/// Aggregate a decoded ballot-level file into department results for `year`.
///
/// Station totals (registered, cast, valid) count once per
/// (department, commune, station) even when a station spans several lines;
/// candidate votes are summed over every line.
pub fn extract_results(
    year: i32,
    content: &str,
    targets: &TargetDepartments,
) -> Result<Vec<ElectionResultRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(header) => header?,
        None => return Ok(Vec::new()),
    };
    let layout = Layout::from_header(&header)?;

    let mut seen_bureaus: HashSet<(String, String, String)> = HashSet::new();
    let mut totals_by_dept: HashMap<String, DepartmentTotals> = HashMap::new();
    let mut candidate_votes: BTreeMap<(String, String), i64> = BTreeMap::new();

    for record in records {
        let record = record?;
        let row: Vec<&str> = record.iter().collect();
        if row.len() <= layout.candidate_start {
            continue;
        }
        let field = |idx: usize| row.get(idx).copied().unwrap_or("");

        let Some(dept_code) = normalize_dept_code(field(layout.dept_code)) else {
            continue;
        };
        if !targets.contains(&dept_code) {
            continue;
        }

        let bureau_key = (
            dept_code.clone(),
            field(layout.commune).trim().to_string(),
            field(layout.bureau).trim().to_string(),
        );
        if seen_bureaus.insert(bureau_key) {
            let totals = totals_by_dept
                .entry(dept_code.clone())
                .or_insert_with(|| DepartmentTotals {
                    dept_name: display_name(field(layout.dept_name), &dept_code),
                    ..Default::default()
                });
            totals.registered += to_int(field(layout.registered)).unwrap_or(0);
            totals.votes_cast += to_int(field(layout.votes_cast)).unwrap_or(0);
            totals.votes_valid += to_int(field(layout.votes_valid)).unwrap_or(0);
        }

        for start in (layout.candidate_start..row.len()).step_by(CHUNK_SIZE) {
            if start + VOTES_OFFSET >= row.len() {
                break;
            }
            // An empty panel marks an unused slot, later slots may be filled.
            if row[start].trim().is_empty() {
                continue;
            }
            let candidate_name = canonical_candidate_name(row[start + NAME_OFFSET].trim());
            let votes = to_int(row[start + VOTES_OFFSET]).unwrap_or(0);
            *candidate_votes
                .entry((dept_code.clone(), candidate_name))
                .or_insert(0) += votes;
        }
    }

    let results: Vec<ElectionResultRow> = candidate_votes
        .into_iter()
        .map(|((dept_code, candidate_name), votes)| {
            let totals = totals_by_dept.get(&dept_code);
            let registered = totals.map(|t| t.registered);
            let votes_cast = totals.map(|t| t.votes_cast);
            let votes_valid = totals.map(|t| t.votes_valid);
            let turnout_rate = match (registered, votes_cast) {
                (Some(reg), Some(cast)) if reg != 0 => Some(round6(cast as f64 / reg as f64)),
                _ => None,
            };
            let vote_share = votes_valid
                .filter(|valid| *valid != 0)
                .map(|valid| round6(votes as f64 / valid as f64));
            ElectionResultRow {
                year,
                dept_name: totals
                    .map(|t| t.dept_name.clone())
                    .unwrap_or_else(|| display_name("", &dept_code)),
                dept_code,
                candidate_name,
                registered,
                votes_cast,
                votes_valid,
                votes: Some(votes),
                vote_share,
                turnout_rate,
            }
        })
        .collect();

    info!(
        year,
        rows = results.len(),
        bureaus = seen_bureaus.len(),
        "ballot text extracted"
    );
    Ok(results)
}

fn display_name(raw: &str, dept_code: &str) -> String {
    match raw.trim() {
        "" => department_name(dept_code).unwrap_or(dept_code).to_string(),
        name => name.to_string(),
    }
}
