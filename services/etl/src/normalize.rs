//! Locale-tolerant text and number normalization.
//!
//! Source files use French formatting (`1 234`, `12,3 %`, accented labels).
//! Every function here is total: malformed input yields `None` (or an empty
//! key), which callers treat as missing data, never as zero.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Decompose and drop combining marks: `"Département"` -> `"Departement"`.
pub fn strip_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Comparison key for headers and names: accents, case, whitespace and
/// punctuation removed. Output only contains `[a-z0-9]`.
pub fn normalize_key(text: &str) -> String {
    strip_diacritics(text.trim())
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Remove thousands separators, switch the decimal comma to a dot and drop
/// percent signs. `None` when nothing is left.
fn clean_numeric(text: &str) -> Option<String> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '%'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Round to six decimals, the precision every stored ratio uses.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub fn to_float(text: &str) -> Option<f64> {
    clean_numeric(text)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Integer counts. Fractional input is rounded half-to-even.
pub fn to_int(text: &str) -> Option<i64> {
    to_float(text).map(|v| v.round_ties_even() as i64)
}

/// Percent text to a ratio in `[0, 1]` scale: `"12,3%"` -> `0.123`.
pub fn to_ratio(text: &str) -> Option<f64> {
    to_float(text).map(|v| round6(v / 100.0))
}

/// Two-character department code: numeric input is zero-padded
/// (`"1"`, `"1.0"` -> `"01"`), anything else is upper-cased and padded
/// (`"2a"` -> `"2A"`).
pub fn normalize_dept_code(value: &str) -> Option<String> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(number) if number.is_finite() => Some(format!("{:0>2}", number.trunc() as i64)),
        _ => Some(format!("{:0>2}", text.to_uppercase())),
    }
}

/// Stable candidate identity across sources: `"Macron_Exp"`, `"MACRON_VOIX"`
/// and `"macron"` all become `"MACRON"`.
pub fn canonical_candidate_name(raw: &str) -> String {
    let base = strip_metric_suffix(raw).replace('_', " ");
    strip_diacritics(&base)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Drop a trailing `_VOIX` / `_EXP` (any case).
fn strip_metric_suffix(raw: &str) -> &str {
    for suffix in ["_VOIX", "_EXP"] {
        if raw.len() >= suffix.len() {
            let split = raw.len() - suffix.len();
            if raw.is_char_boundary(split) && raw[split..].eq_ignore_ascii_case(suffix) {
                return &raw[..split];
            }
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // KEY NORMALIZATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_key_strips_accents_case_and_spaces() {
        assert_eq!(
            normalize_key("Libellé Du Département"),
            "libelledudepartement"
        );
    }

    #[test]
    fn test_normalize_key_strips_punctuation() {
        assert_eq!(normalize_key("  Code du b.vote "), "codedubvote");
        assert_eq!(normalize_key("N°Panneau"), "npanneau");
        assert_eq!(normalize_key("Val-d'Oise"), "valdoise");
    }

    #[test]
    fn test_normalize_key_output_alphabet() {
        for input in ["Exprimés", "% Vot/Ins", "Œuvre ÉTÉ 2017", "\u{a0}Inscrits\t"] {
            let key = normalize_key(input);
            assert!(
                key.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
                "{input:?} -> {key:?}"
            );
        }
    }

    #[test]
    fn test_normalize_key_empty() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key("   "), "");
    }

    // -------------------------------------------------------------------------
    // NUMBERS
    // -------------------------------------------------------------------------

    #[test]
    fn test_to_ratio_percent_variants() {
        assert_eq!(to_ratio("12,3%"), Some(0.123));
        assert_eq!(to_ratio("12.3"), Some(0.123));
        assert_eq!(to_ratio("12,3"), Some(0.123));
        assert_eq!(to_ratio(" 12,3 % "), Some(0.123));
    }

    #[test]
    fn test_to_ratio_rounds_to_six_decimals() {
        assert_eq!(to_ratio("33,33333333"), Some(0.333333));
    }

    #[test]
    fn test_to_int_thousands_separators() {
        assert_eq!(to_int("1 234 567"), Some(1_234_567));
        assert_eq!(to_int("1\u{a0}234"), Some(1234));
        assert_eq!(to_int("1\u{202f}234"), Some(1234));
    }

    #[test]
    fn test_to_int_rounds_fractions() {
        assert_eq!(to_int("390.0"), Some(390));
        assert_eq!(to_int("12,6"), Some(13));
        assert_eq!(to_int("2.5"), Some(2));
    }

    #[test]
    fn test_to_float_comma_decimal() {
        assert_eq!(to_float("21 345,5"), Some(21345.5));
    }

    #[test]
    fn test_unparseable_is_none_not_zero() {
        assert_eq!(to_int(""), None);
        assert_eq!(to_int("n/a"), None);
        assert_eq!(to_float("-"), None);
        assert_eq!(to_ratio("%"), None);
        assert_eq!(to_float("nan"), None);
        assert_eq!(to_float("inf"), None);
    }

    // -------------------------------------------------------------------------
    // DEPARTMENT CODES
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_dept_code_numeric() {
        assert_eq!(normalize_dept_code("75"), Some("75".to_string()));
        assert_eq!(normalize_dept_code("1"), Some("01".to_string()));
        assert_eq!(normalize_dept_code("91.0"), Some("91".to_string()));
        assert_eq!(normalize_dept_code(" 7 "), Some("07".to_string()));
    }

    #[test]
    fn test_normalize_dept_code_alphanumeric() {
        assert_eq!(normalize_dept_code("2a"), Some("2A".to_string()));
        assert_eq!(normalize_dept_code("ZA"), Some("ZA".to_string()));
        assert_eq!(normalize_dept_code("b"), Some("0B".to_string()));
    }

    #[test]
    fn test_normalize_dept_code_empty() {
        assert_eq!(normalize_dept_code(""), None);
        assert_eq!(normalize_dept_code("  "), None);
    }

    // -------------------------------------------------------------------------
    // CANDIDATE NAMES
    // -------------------------------------------------------------------------

    #[test]
    fn test_candidate_name_suffixes() {
        assert_eq!(canonical_candidate_name("MACRON_VOIX"), "MACRON");
        assert_eq!(canonical_candidate_name("Macron_Exp"), "MACRON");
        assert_eq!(canonical_candidate_name("macron_voix"), "MACRON");
    }

    #[test]
    fn test_candidate_name_underscores_and_accents() {
        assert_eq!(canonical_candidate_name("LE_PEN_VOIX"), "LE PEN");
        assert_eq!(canonical_candidate_name("Mélenchon"), "MELENCHON");
        assert_eq!(canonical_candidate_name("  DUPONT-AIGNAN  "), "DUPONT-AIGNAN");
    }

    #[test]
    fn test_candidate_name_collapses_whitespace() {
        assert_eq!(canonical_candidate_name("DE   GAULLE"), "DE GAULLE");
        assert_eq!(canonical_candidate_name("Chaban__Delmas"), "CHABAN DELMAS");
    }

    #[test]
    fn test_candidate_name_suffix_only_at_end() {
        assert_eq!(canonical_candidate_name("VOIX_LIBRE"), "VOIX LIBRE");
        assert_eq!(canonical_candidate_name("EXP"), "EXP");
    }
}
