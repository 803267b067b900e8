//! Column resolution across differently-spelled source headers.
//!
//! Each source format declares, per canonical field, the normalized header
//! spellings it accepts. Resolution walks the source columns in their
//! declared order and keeps the first hit.

use crate::normalize::normalize_key;

/// Canonical fields the election extractors look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DeptCode,
    DeptName,
    Registered,
    VotesCast,
    VotesValid,
    Participation,
}

/// Ordered, normalized aliases accepted for one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: Field,
    pub aliases: &'static [&'static str],
}

/// Headers used by the per-department spreadsheets (1969-2022).
pub const SPREADSHEET_ALIASES: &[FieldAliases] = &[
    FieldAliases {
        field: Field::DeptCode,
        aliases: &["depcode", "codedudepartement"],
    },
    FieldAliases {
        field: Field::DeptName,
        aliases: &["depnom", "departement", "libelledudepartement"],
    },
    FieldAliases {
        field: Field::Registered,
        aliases: &["inscrits", "ins"],
    },
    FieldAliases {
        field: Field::VotesCast,
        aliases: &["votants"],
    },
    FieldAliases {
        field: Field::VotesValid,
        aliases: &["exprimes", "exp"],
    },
    FieldAliases {
        field: Field::Participation,
        aliases: &["participation"],
    },
];

/// Normalized headers that are never candidate columns, whatever their
/// cells contain.
pub const METADATA_COLUMNS: &[&str] = &[
    "departement",
    "depnom",
    "depcode",
    "codedudepartement",
    "libelledudepartement",
    "participation",
    "inscrits",
    "ins",
    "abstentions",
    "votants",
    "blancs",
    "nuls",
    "exprimes",
    "exp",
    "etatsaisie",
    "deptcode",
    "deptname",
];

pub fn is_metadata_column(column: &str) -> bool {
    METADATA_COLUMNS.contains(&normalize_key(column).as_str())
}

/// Index of the first column whose normalized name is accepted. Order
/// follows `columns`, not `accepted`.
pub fn first_matching_column<S: AsRef<str>>(columns: &[S], accepted: &[&str]) -> Option<usize> {
    columns
        .iter()
        .position(|column| accepted.contains(&normalize_key(column.as_ref()).as_str()))
}

/// Resolved column index per field for one concrete header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    resolved: Vec<(Field, usize)>,
}

impl ColumnMap {
    pub fn resolve<S: AsRef<str>>(columns: &[S], table: &[FieldAliases]) -> Self {
        let resolved = table
            .iter()
            .filter_map(|entry| {
                first_matching_column(columns, entry.aliases).map(|idx| (entry.field, idx))
            })
            .collect();
        Self { resolved }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.resolved
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, idx)| *idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_column_is_accent_and_case_insensitive() {
        let columns = ["Code du département", "Libellé du département", "Inscrits"];
        assert_eq!(
            first_matching_column(&columns, &["libelledudepartement"]),
            Some(1)
        );
        assert_eq!(first_matching_column(&columns, &["inscrits", "ins"]), Some(2));
    }

    #[test]
    fn test_first_matching_column_follows_source_order() {
        // "INS" comes first in the sheet even though "inscrits" is listed
        // first among the aliases.
        let columns = ["DepCode", "INS", "Inscrits"];
        assert_eq!(first_matching_column(&columns, &["inscrits", "ins"]), Some(1));
    }

    #[test]
    fn test_first_matching_column_none() {
        let columns = ["A", "B"];
        assert_eq!(first_matching_column(&columns, &["votants"]), None);
    }

    #[test]
    fn test_column_map_resolves_decade_spellings() {
        let old = ["DEPARTEMENT", "INS", "VOTANTS", "EXP", "DE GAULLE"];
        let map = ColumnMap::resolve(&old, SPREADSHEET_ALIASES);
        assert_eq!(map.get(Field::DeptCode), None);
        assert_eq!(map.get(Field::DeptName), Some(0));
        assert_eq!(map.get(Field::Registered), Some(1));
        assert_eq!(map.get(Field::VotesCast), Some(2));
        assert_eq!(map.get(Field::VotesValid), Some(3));
        assert_eq!(map.get(Field::Participation), None);

        let new = ["DepCode", "DepNom", "Inscrits", "Votants", "Exprimés", "Participation"];
        let map = ColumnMap::resolve(&new, SPREADSHEET_ALIASES);
        assert_eq!(map.get(Field::DeptCode), Some(0));
        assert_eq!(map.get(Field::VotesValid), Some(4));
        assert_eq!(map.get(Field::Participation), Some(5));
    }

    // The candidate fallback leans entirely on this list; pin it.
    #[test]
    fn test_metadata_exclusion_list_is_pinned() {
        assert_eq!(
            METADATA_COLUMNS,
            &[
                "departement",
                "depnom",
                "depcode",
                "codedudepartement",
                "libelledudepartement",
                "participation",
                "inscrits",
                "ins",
                "abstentions",
                "votants",
                "blancs",
                "nuls",
                "exprimes",
                "exp",
                "etatsaisie",
                "deptcode",
                "deptname",
            ]
        );
    }

    #[test]
    fn test_is_metadata_column() {
        assert!(is_metadata_column("Exprimés"));
        assert!(is_metadata_column("Etat saisie"));
        assert!(is_metadata_column("Abstentions"));
        assert!(!is_metadata_column("MITTERRAND"));
        assert!(!is_metadata_column("% Abs/Ins"));
    }
}
