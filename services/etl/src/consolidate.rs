//! Merge extractor outputs into one row per (year, department, candidate).

use crate::model::ElectionResultRow;
use crate::normalize::round6;
use std::collections::{BTreeMap, HashSet};

type GroupKey = (i32, String, String, String);

/// Bit-exact identity of a row, used to drop repeated reports.
type RowFingerprint = (GroupKey, [Option<i64>; 4], [Option<u64>; 2]);

fn fingerprint(row: &ElectionResultRow) -> RowFingerprint {
    (
        group_key(row),
        [row.registered, row.votes_cast, row.votes_valid, row.votes],
        [
            row.vote_share.map(f64::to_bits),
            row.turnout_rate.map(f64::to_bits),
        ],
    )
}

fn group_key(row: &ElectionResultRow) -> GroupKey {
    (
        row.year,
        row.dept_code.clone(),
        row.dept_name.clone(),
        row.candidate_name.clone(),
    )
}

fn max_int(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn max_float(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Sum that stays `None` only while every contribution is `None`.
fn sum_int(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

/// Consolidate rows from any number of extractors.
///
/// Bit-identical rows are counted once. Within a
/// (year, department code, department name, candidate) group the totals and
/// ratios take the largest reported value and votes are summed. Whenever
/// votes and a non-zero valid-vote count are both known, the share is
/// recomputed from them. Output is sorted by the group key.
pub fn consolidate<I>(rows: I) -> Vec<ElectionResultRow>
where
    I: IntoIterator<Item = ElectionResultRow>,
{
    let mut seen: HashSet<RowFingerprint> = HashSet::new();
    let mut groups: BTreeMap<GroupKey, ElectionResultRow> = BTreeMap::new();

    for row in rows {
        if !seen.insert(fingerprint(&row)) {
            continue;
        }
        match groups.get_mut(&group_key(&row)) {
            Some(merged) => {
                merged.registered = max_int(merged.registered, row.registered);
                merged.votes_cast = max_int(merged.votes_cast, row.votes_cast);
                merged.votes_valid = max_int(merged.votes_valid, row.votes_valid);
                merged.votes = sum_int(merged.votes, row.votes);
                merged.vote_share = max_float(merged.vote_share, row.vote_share);
                merged.turnout_rate = max_float(merged.turnout_rate, row.turnout_rate);
            }
            None => {
                groups.insert(group_key(&row), row);
            }
        }
    }

    groups
        .into_values()
        .map(|mut row| {
            if let (Some(votes), Some(valid)) = (row.votes, row.votes_valid) {
                if valid != 0 {
                    row.vote_share = Some(round6(votes as f64 / valid as f64));
                }
            }
            row
        })
        .collect()
}
