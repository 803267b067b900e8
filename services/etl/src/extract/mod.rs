//! Per-source extractors. Each one turns raw source bytes into canonical
//! rows restricted to the configured target departments.

pub mod ballot_text;
pub mod indicators;
pub mod spreadsheet;

use crate::catalog::IDF_DEPARTMENTS;
use crate::normalize::normalize_dept_code;
use std::collections::BTreeSet;

pub use spreadsheet::Table;

/// Department codes a run is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDepartments(BTreeSet<String>);

impl TargetDepartments {
    /// Codes are normalized (`"1"` -> `"01"`); blanks are dropped.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            codes
                .into_iter()
                .filter_map(|code| normalize_dept_code(code.as_ref()))
                .collect(),
        )
    }

    /// The eight Île-de-France departments.
    pub fn idf() -> Self {
        Self::new(IDF_DEPARTMENTS.iter().map(|(code, _)| *code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    /// Codes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decode a Latin-1 source file.
pub fn decode_latin1(bytes: &[u8]) -> String {
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}
