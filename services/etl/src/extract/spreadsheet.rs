//! Per-department first-round workbooks (one row per department).
//!
//! Header spellings drift across decades, so every field goes through the
//! alias table. Candidates are detected in two tiers:
//!
//! 1. structured: `<NAME>_VOIX` vote columns, optionally paired with
//!    `<NAME>_EXP` share columns;
//! 2. share-only: when the sheet has no `_VOIX` column at all, any
//!    non-metadata column whose cell parses as a percentage is a candidate.
//!
//! The tiers are never mixed within a sheet.

use crate::catalog::{department_code_by_name, department_name};
use crate::columns::{is_metadata_column, ColumnMap, Field, SPREADSHEET_ALIASES};
use crate::error::{Error, Result};
use crate::extract::TargetDepartments;
use crate::model::ElectionResultRow;
use crate::normalize::{canonical_candidate_name, normalize_dept_code, round6, to_int, to_ratio};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::{debug, info};

/// A sheet reduced to trimmed header names and stringified cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<S>>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|c| {
                    let c: String = c.into();
                    c.trim().to_string()
                })
                .collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// First row is the header; blank header cells become `Unnamed: <idx>`.
    pub fn from_range(range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header
                .iter()
                .enumerate()
                .map(|(idx, cell)| match cell_text(cell) {
                    name if name.is_empty() => format!("Unnamed: {idx}"),
                    name => name,
                })
                .collect(),
            None => return Self::default(),
        };
        let rows = rows
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(cell_text).collect();
                cells.resize(columns.len(), String::new());
                cells
            })
            .collect();
        Self { columns, rows }
    }

    /// Exact header lookup.
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Cell value as the text a CSV export would show: integral floats lose
/// their `.0`, errors and blanks are empty.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i)).map(String::as_str)
}

/// Open a workbook (xls/xlsx/ods, detected from the file) and read one sheet.
pub fn read_sheet(path: &Path, sheet_name: &str) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range(sheet_name)?;
    let (row_count, col_count) = range.get_size();
    debug!(sheet = sheet_name, row_count, col_count, "sheet loaded");
    Ok(Table::from_range(&range))
}

/// A `_VOIX` vote column and its optional `_EXP` share column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteColumns {
    pub candidate_name: String,
    pub votes: usize,
    pub share: Option<usize>,
}

/// How candidates are laid out in a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateLayout {
    Structured(Vec<VoteColumns>),
    ShareOnly(Vec<usize>),
}

fn voix_base(column: &str) -> Option<&str> {
    let split = column.len().checked_sub("_VOIX".len())?;
    if column.is_char_boundary(split) && column[split..].eq_ignore_ascii_case("_VOIX") {
        Some(&column[..split])
    } else {
        None
    }
}

/// Decide the candidate layout once per sheet.
pub fn detect_candidate_layout(table: &Table) -> CandidateLayout {
    let structured: Vec<VoteColumns> = table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(idx, column)| {
            let base = voix_base(column)?;
            Some(VoteColumns {
                candidate_name: canonical_candidate_name(column),
                votes: idx,
                share: table.column_index(&format!("{base}_EXP")),
            })
        })
        .collect();
    if !structured.is_empty() {
        return CandidateLayout::Structured(structured);
    }

    CandidateLayout::ShareOnly(
        table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.starts_with("Unnamed") && !is_metadata_column(column))
            .map(|(idx, _)| idx)
            .collect(),
    )
}

/// Department-level totals shared by every candidate row of a sheet row.
struct RowTotals {
    registered: Option<i64>,
    votes_cast: Option<i64>,
    votes_valid: Option<i64>,
    turnout_rate: Option<f64>,
}

/// Extract first-round results for `year` from one sheet.
///
/// Fails only when no department column (code or name) can be resolved.
/// Rows outside `targets` and cells without a parseable share are skipped.
pub fn extract_results(
    year: i32,
    table: &Table,
    targets: &TargetDepartments,
) -> Result<Vec<ElectionResultRow>> {
    let map = ColumnMap::resolve(&table.columns, SPREADSHEET_ALIASES);
    let code_col = map.get(Field::DeptCode);
    let name_col = map.get(Field::DeptName);
    if code_col.is_none() && name_col.is_none() {
        return Err(Error::Schema {
            origin: format!("spreadsheet for year {year}"),
            detail: "could not find department code or name columns".to_string(),
        });
    }

    let layout = detect_candidate_layout(table);
    debug!(year, ?layout, "candidate layout");

    let mut records = Vec::new();
    for row in &table.rows {
        let dept_code = match code_col {
            Some(_) => cell(row, code_col).and_then(normalize_dept_code),
            None => cell(row, name_col)
                .and_then(department_code_by_name)
                .map(str::to_string),
        };
        let Some(dept_code) = dept_code.filter(|code| targets.contains(code)) else {
            continue;
        };
        let dept_name = cell(row, name_col)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| department_name(&dept_code).map(str::to_string))
            .unwrap_or_else(|| dept_code.clone());

        let totals = row_totals(row, &map);
        let push = |records: &mut Vec<ElectionResultRow>, candidate_name, votes, vote_share| {
            records.push(ElectionResultRow {
                year,
                dept_code: dept_code.clone(),
                dept_name: dept_name.clone(),
                candidate_name,
                registered: totals.registered,
                votes_cast: totals.votes_cast,
                votes_valid: totals.votes_valid,
                votes,
                vote_share: Some(vote_share),
                turnout_rate: totals.turnout_rate,
            })
        };

        match &layout {
            CandidateLayout::Structured(candidates) => {
                for candidate in candidates {
                    let mut votes = cell(row, Some(candidate.votes)).and_then(to_int);
                    let mut vote_share = cell(row, candidate.share).and_then(to_ratio);
                    let valid = totals.votes_valid.filter(|v| *v != 0);
                    if let (None, Some(v), Some(valid)) = (vote_share, votes, valid) {
                        vote_share = Some(round6(v as f64 / valid as f64));
                    }
                    if let (None, Some(share), Some(valid)) = (votes, vote_share, valid) {
                        votes = Some((valid as f64 * share).round_ties_even() as i64);
                    }
                    if let Some(share) = vote_share {
                        push(&mut records, candidate.candidate_name.clone(), votes, share);
                    }
                }
            }
            CandidateLayout::ShareOnly(columns) => {
                for &idx in columns {
                    let Some(share) = cell(row, Some(idx)).and_then(to_ratio) else {
                        continue;
                    };
                    let votes = totals
                        .votes_valid
                        .map(|valid| (valid as f64 * share).round_ties_even() as i64);
                    push(
                        &mut records,
                        canonical_candidate_name(&table.columns[idx]),
                        votes,
                        share,
                    );
                }
            }
        }
    }

    info!(year, rows = records.len(), "spreadsheet extracted");
    Ok(records)
}

fn row_totals(row: &[String], map: &ColumnMap) -> RowTotals {
    let registered = cell(row, map.get(Field::Registered)).and_then(to_int);
    let votes_cast = cell(row, map.get(Field::VotesCast)).and_then(to_int);
    let votes_valid = cell(row, map.get(Field::VotesValid)).and_then(to_int);

    // A participation column wins even when its cell is blank.
    let turnout_rate = match map.get(Field::Participation) {
        Some(idx) => cell(row, Some(idx)).and_then(to_ratio),
        None => match (registered, votes_cast) {
            (Some(reg), Some(cast)) if reg != 0 => Some(round6(cast as f64 / reg as f64)),
            _ => None,
        },
    };

    RowTotals {
        registered,
        votes_cast,
        votes_valid,
        turnout_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::consolidate;

    fn targets() -> TargetDepartments {
        TargetDepartments::idf()
    }

    // -------------------------------------------------------------------------
    // STRUCTURED LAYOUT (_VOIX / _EXP)
    // -------------------------------------------------------------------------

    #[test]
    fn test_end_to_end_single_department() {
        let table = Table::new(
            vec!["DepCode", "DepNom", "Inscrits", "Votants", "Exprimes", "DUPONT_VOIX", "DUPONT_EXP"],
            vec![vec!["75", "Paris", "1000", "800", "780", "390", "0.5"]],
        );

        let rows = consolidate(extract_results(2007, &table, &targets()).unwrap());

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.year, 2007);
        assert_eq!(row.dept_code, "75");
        assert_eq!(row.dept_name, "Paris");
        assert_eq!(row.candidate_name, "DUPONT");
        assert_eq!(row.registered, Some(1000));
        assert_eq!(row.votes_cast, Some(800));
        assert_eq!(row.votes_valid, Some(780));
        assert_eq!(row.votes, Some(390));
        assert_eq!(row.vote_share, Some(0.5));
        assert_eq!(row.turnout_rate, Some(0.8));
    }

    #[test]
    fn test_share_derived_from_votes_when_exp_missing() {
        let table = Table::new(
            vec!["DepCode", "Inscrits", "Votants", "Exprimés", "MARTIN_VOIX"],
            vec![vec!["92", "1000", "900", "800", "200"]],
        );
        let rows = extract_results(2012, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vote_share, Some(0.25));
        assert_eq!(rows[0].votes, Some(200));
        assert_eq!(rows[0].dept_name, "Hauts-de-Seine");
    }

    #[test]
    fn test_votes_back_computed_from_share() {
        let table = Table::new(
            vec!["DepCode", "Exprimés", "MARTIN_VOIX", "MARTIN_EXP"],
            vec![vec!["93", "1000", "", "12,5"]],
        );
        let rows = extract_results(2012, &table, &targets()).unwrap();
        assert_eq!(rows[0].vote_share, Some(0.125));
        assert_eq!(rows[0].votes, Some(125));
    }

    #[test]
    fn test_candidate_without_any_share_is_dropped() {
        let table = Table::new(
            vec!["DepCode", "MARTIN_VOIX", "DURAND_VOIX"],
            vec![vec!["75", "", "10"]],
        );
        // No valid-vote total: neither share can be derived.
        let rows = extract_results(2012, &table, &targets()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_structured_layout_short_circuits_ratio_sniffing() {
        // "Score moyen" parses as a ratio but must not become a candidate
        // once _VOIX columns exist.
        let table = Table::new(
            vec!["DepCode", "Exprimés", "DUPONT_VOIX", "DUPONT_EXP", "Score moyen"],
            vec![vec!["75", "100", "40", "40", "12,5"]],
        );
        let rows = extract_results(2022, &table, &targets()).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.candidate_name.as_str()).collect();
        assert_eq!(names, vec!["DUPONT"]);
    }

    #[test]
    fn test_participation_column_preferred_for_turnout() {
        let table = Table::new(
            vec!["DepCode", "Inscrits", "Votants", "Participation", "A_VOIX", "A_EXP"],
            vec![vec!["78", "1000", "800", "79,5%", "10", "1"]],
        );
        let rows = extract_results(2002, &table, &targets()).unwrap();
        assert_eq!(rows[0].turnout_rate, Some(0.795));
    }

    #[test]
    fn test_blank_participation_cell_does_not_fall_back() {
        let table = Table::new(
            vec!["DepCode", "Inscrits", "Votants", "Participation", "A_VOIX", "A_EXP"],
            vec![vec!["78", "1000", "800", "", "10", "1"]],
        );
        let rows = extract_results(2002, &table, &targets()).unwrap();
        assert_eq!(rows[0].turnout_rate, None);
    }

    // -------------------------------------------------------------------------
    // SHARE-ONLY FALLBACK
    // -------------------------------------------------------------------------

    #[test]
    fn test_share_only_layout_detects_candidates() {
        let table = Table::new(
            vec!["DEPARTEMENT", "INS", "VOTANTS", "EXP", "Unnamed: 4", "POMPIDOU", "POHER", "DUCLOS"],
            vec![vec!["PARIS", "1000", "700", "600", "3", "44,5", "23,3", "21,3"]],
        );
        let rows = extract_results(1969, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.dept_code == "75"));
        assert_eq!(rows[0].candidate_name, "POMPIDOU");
        assert_eq!(rows[0].vote_share, Some(0.445));
        assert_eq!(rows[0].votes, Some(267));
        assert_eq!(rows[0].turnout_rate, Some(0.7));
        assert_eq!(rows[0].dept_name, "PARIS");
    }

    #[test]
    fn test_share_only_excludes_metadata_columns() {
        let table = Table::new(
            vec![
                "Code du département",
                "Libellé du département",
                "Inscrits",
                "Abstentions",
                "Votants",
                "Blancs",
                "Nuls",
                "Exprimés",
                "Etat saisie",
                "Participation",
                "GISCARD",
            ],
            vec![vec!["91", "Essonne", "10", "2", "8", "1", "1", "6", "5", "80", "50"]],
        );
        let layout = detect_candidate_layout(&table);
        assert_eq!(layout, CandidateLayout::ShareOnly(vec![10]));

        let rows = extract_results(1974, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_name, "GISCARD");
        assert_eq!(rows[0].votes, Some(3));
    }

    #[test]
    fn test_share_only_skips_unparseable_cells() {
        let table = Table::new(
            vec!["DepCode", "A", "B"],
            vec![vec!["94", "n.c.", "12"]],
        );
        let rows = extract_results(1981, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].candidate_name, "B");
        assert_eq!(rows[0].votes, None);
    }

    // -------------------------------------------------------------------------
    // DEPARTMENTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_rows_outside_targets_are_filtered() {
        let table = Table::new(
            vec!["DepCode", "Exprimes", "X_VOIX"],
            vec![
                vec!["13", "100", "10"],
                vec!["75", "100", "20"],
                vec!["", "100", "30"],
            ],
        );
        let rows = extract_results(2007, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dept_code, "75");
    }

    #[test]
    fn test_code_derived_from_accented_name() {
        let table = Table::new(
            vec!["Département", "Exprimés", "X_VOIX"],
            vec![vec!["VAL D'OISE", "100", "10"], vec!["Rhône", "100", "10"]],
        );
        let rows = extract_results(1988, &table, &targets()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dept_code, "95");
        assert_eq!(rows[0].dept_name, "VAL D'OISE");
    }

    #[test]
    fn test_missing_department_columns_is_schema_error() {
        let table = Table::new(vec!["Inscrits", "X_VOIX"], vec![vec!["1", "2"]]);
        let err = extract_results(1995, &table, &targets()).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(err.to_string().contains("1995"));
    }

    #[test]
    fn test_numeric_codes_are_padded() {
        let targets = TargetDepartments::new(["01"]);
        let table = Table::new(vec!["DepCode", "Exprimes", "X_VOIX"], vec![vec!["1", "10", "5"]]);
        let rows = extract_results(2007, &table, &targets).unwrap();
        assert_eq!(rows[0].dept_code, "01");
        // Not in the catalogue: the code doubles as the name.
        assert_eq!(rows[0].dept_name, "01");
    }

    // -------------------------------------------------------------------------
    // CELL CONVERSION
    // -------------------------------------------------------------------------

    #[test]
    fn test_cell_text_formats() {
        assert_eq!(cell_text(&Data::Float(75.0)), "75");
        assert_eq!(cell_text(&Data::Float(0.5)), "0.5");
        assert_eq!(cell_text(&Data::Int(1000)), "1000");
        assert_eq!(cell_text(&Data::String("  Paris ".into())), "Paris");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn test_table_from_range_names_blank_headers() {
        let mut range: Range<Data> = Range::new((0, 0), (1, 2));
        range.set_value((0, 0), Data::String("DepCode".into()));
        range.set_value((0, 2), Data::String(" Inscrits ".into()));
        range.set_value((1, 0), Data::Float(75.0));
        range.set_value((1, 2), Data::Float(1000.0));

        let table = Table::from_range(&range);
        assert_eq!(table.columns, vec!["DepCode", "Unnamed: 1", "Inscrits"]);
        assert_eq!(table.rows, vec![vec!["75", "", "1000"]]);
    }
}
