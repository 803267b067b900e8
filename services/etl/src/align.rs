//! Carry sparse indicator observations forward onto election years.

use crate::model::{aligned_provenance, IndicatorValueRow};
use std::collections::BTreeMap;

/// One value per (indicator, geography, target year) for which an
/// observation exists at or before the target year.
///
/// Exact-year observations are copied verbatim; otherwise the nearest prior
/// observation is used and its provenance annotated with
/// `[aligned_from=<year>]`. Duplicate observations of one year resolve to
/// the last one seen. `target_years` need not be sorted.
pub fn align_to_years(values: &[IndicatorValueRow], target_years: &[i32]) -> Vec<IndicatorValueRow> {
    // (indicator, geography) -> year -> observation
    let mut series: BTreeMap<(&str, &str), BTreeMap<i32, &IndicatorValueRow>> = BTreeMap::new();
    for value in values {
        series
            .entry((value.indicator_code.as_str(), value.insee_code.as_str()))
            .or_default()
            .insert(value.year, value);
    }

    let mut targets = target_years.to_vec();
    targets.sort_unstable();
    targets.dedup();

    let mut aligned = Vec::new();
    for observations in series.values() {
        for &target in &targets {
            let Some((&source_year, source)) = observations.range(..=target).next_back() else {
                continue;
            };
            let source_file = if source_year == target {
                source.source_file.clone()
            } else {
                aligned_provenance(&source.source_file, source_year)
            };
            aligned.push(IndicatorValueRow {
                indicator_code: source.indicator_code.clone(),
                insee_code: source.insee_code.clone(),
                year: target,
                value: source.value,
                source_file,
            });
        }
    }
    aligned
}
