//! Socio-economic indicators from the INSEE sustainable-development table
//! (`ODD_DEP.csv` inside a zip, semicolon separated, Latin-1).
//!
//! The table is wide: one row per (department, variable, sous_champ) and one
//! `AYYYY` column per observation year.

use crate::catalog::{department_insee_code, IndicatorSpec, ODD_DEP_FILENAME};
use crate::error::{Error, Result};
use crate::extract::{decode_latin1, TargetDepartments};
use crate::model::IndicatorValueRow;
use crate::normalize::{normalize_dept_code, to_float};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use tracing::{info, warn};

/// Read and decode the `ODD_DEP.csv` member of the downloaded archive.
pub fn read_odd_table(zip_bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;
    let mut member = archive.by_name(ODD_DEP_FILENAME)?;
    let mut bytes = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut bytes)?;
    Ok(decode_latin1(&bytes))
}

/// `A2019` -> `Some(2019)`.
fn year_column(name: &str) -> Option<i32> {
    let digits = name.strip_prefix('A')?;
    if digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn matches_spec(spec: &IndicatorSpec, variable: &str, sous_champ: &str) -> bool {
    if variable != spec.variable {
        return false;
    }
    match spec.sous_champ {
        None => sous_champ.trim().is_empty(),
        Some(expected) => sous_champ.trim() == expected,
    }
}

/// Long-format indicator values for `specs`, restricted to `targets`.
///
/// Output is sorted by (indicator, geography, year) with one row per key;
/// on duplicates the last one read wins.
pub fn extract_values(
    content: &str,
    specs: &[IndicatorSpec],
    targets: &TargetDepartments,
) -> Result<Vec<IndicatorValueRow>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| Error::Schema {
                origin: ODD_DEP_FILENAME.to_string(),
                detail: format!("missing column {name:?}"),
            })
    };
    let codgeo_col = column("codgeo")?;
    let variable_col = column("variable")?;
    let sous_champ_col = column("sous_champ")?;

    let mut year_columns: Vec<(i32, usize)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| year_column(name.trim()).map(|year| (year, idx)))
        .collect();
    year_columns.sort_unstable();

    // Keep only target departments up front; the table covers all of France.
    let mut rows: Vec<(String, csv::StringRecord)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(code) = record.get(codgeo_col).and_then(normalize_dept_code) else {
            continue;
        };
        if targets.contains(&code) {
            rows.push((code, record));
        }
    }

    let mut values: BTreeMap<(String, String, i32), IndicatorValueRow> = BTreeMap::new();
    for spec in specs {
        let source_file = spec.source_label();
        let mut matched = 0usize;
        for (code, record) in &rows {
            let variable = record.get(variable_col).unwrap_or("");
            let sous_champ = record.get(sous_champ_col).unwrap_or("");
            if !matches_spec(spec, variable, sous_champ) {
                continue;
            }
            matched += 1;
            let insee_code = department_insee_code(code);
            for &(year, idx) in &year_columns {
                let Some(value) = record.get(idx).and_then(to_float) else {
                    continue;
                };
                let row = IndicatorValueRow {
                    indicator_code: spec.indicator_code.to_string(),
                    insee_code: insee_code.clone(),
                    year,
                    value,
                    source_file: source_file.clone(),
                };
                values.insert(
                    (row.indicator_code.clone(), row.insee_code.clone(), year),
                    row,
                );
            }
        }
        if matched == 0 {
            warn!(
                indicator = spec.indicator_code,
                variable = spec.variable,
                sous_champ = ?spec.sous_champ,
                "no socio values found"
            );
        }
    }

    let values: Vec<IndicatorValueRow> = values.into_values().collect();
    info!(rows = values.len(), "indicator table extracted");
    Ok(values)
}
