//! Canonical in-memory rows produced by the extractors.
//!
//! These rows carry natural keys only; storage identities are resolved by
//! the loader.

use serde::Serialize;

/// One candidate's first-round outcome in one department.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectionResultRow {
    pub year: i32,
    pub dept_code: String,
    pub dept_name: String,
    pub candidate_name: String,
    pub registered: Option<i64>,
    pub votes_cast: Option<i64>,
    pub votes_valid: Option<i64>,
    pub votes: Option<i64>,
    pub vote_share: Option<f64>,
    pub turnout_rate: Option<f64>,
}

impl ElectionResultRow {
    /// Uniqueness key after consolidation.
    pub fn key(&self) -> (i32, &str, &str) {
        (self.year, &self.dept_code, &self.candidate_name)
    }
}

/// One socio-economic measurement for one geography and year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorValueRow {
    pub indicator_code: String,
    pub insee_code: String,
    pub year: i32,
    pub value: f64,
    pub source_file: String,
}

impl IndicatorValueRow {
    pub fn key(&self) -> (&str, &str, i32) {
        (&self.indicator_code, &self.insee_code, self.year)
    }

    /// Source year when the value was carried forward, `None` for
    /// exact-year rows.
    pub fn aligned_from(&self) -> Option<i32> {
        let start = self.source_file.rfind(ALIGNED_FROM_PREFIX)? + ALIGNED_FROM_PREFIX.len();
        let rest = &self.source_file[start..];
        rest.strip_suffix(']')?.parse().ok()
    }
}

const ALIGNED_FROM_PREFIX: &str = "[aligned_from=";

/// Provenance for a value carried forward from `source_year`.
pub fn aligned_provenance(source_file: &str, source_year: i32) -> String {
    format!("{source_file} {ALIGNED_FROM_PREFIX}{source_year}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(source_file: &str) -> IndicatorValueRow {
        IndicatorValueRow {
            indicator_code: "poverty_rate".into(),
            insee_code: "75000".into(),
            year: 2012,
            value: 15.1,
            source_file: source_file.into(),
        }
    }

    #[test]
    fn test_aligned_from_round_trips_through_provenance() {
        let row = value(&aligned_provenance("INSEE (variable=taux_pvt)", 2007));
        assert_eq!(row.source_file, "INSEE (variable=taux_pvt) [aligned_from=2007]");
        assert_eq!(row.aligned_from(), Some(2007));
    }

    #[test]
    fn test_exact_rows_have_no_alignment() {
        assert_eq!(value("INSEE (variable=taux_pvt)").aligned_from(), None);
    }
}
