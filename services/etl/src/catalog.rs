//! Static source catalogue: geography, election calendar, source URLs and
//! indicator definitions.

use crate::normalize::normalize_key;
use chrono::NaiveDate;

/// Île-de-France departments, the default target set.
pub const IDF_DEPARTMENTS: &[(&str, &str)] = &[
    ("75", "Paris"),
    ("77", "Seine-et-Marne"),
    ("78", "Yvelines"),
    ("91", "Essonne"),
    ("92", "Hauts-de-Seine"),
    ("93", "Seine-Saint-Denis"),
    ("94", "Val-de-Marne"),
    ("95", "Val-d'Oise"),
];

/// Extra spellings found in older sheets.
const DEPARTMENT_NAME_VARIANTS: &[(&str, &str)] = &[
    ("SEINE ET MARNE", "77"),
    ("HAUTS DE SEINE", "92"),
    ("SEINE SAINT DENIS", "93"),
    ("VAL DE MARNE", "94"),
    ("VAL D OISE", "95"),
    ("VAL D'OISE", "95"),
];

pub fn department_name(code: &str) -> Option<&'static str> {
    IDF_DEPARTMENTS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Department code from a free-text name, ignoring accents, case and
/// punctuation.
pub fn department_code_by_name(name: &str) -> Option<&'static str> {
    let key = normalize_key(name);
    if key.is_empty() {
        return None;
    }
    IDF_DEPARTMENTS
        .iter()
        .map(|(code, name)| (*name, *code))
        .chain(DEPARTMENT_NAME_VARIANTS.iter().copied())
        .find(|(candidate, _)| normalize_key(candidate) == key)
        .map(|(_, code)| code)
}

/// Department-level rows use the `000` commune suffix.
pub fn department_insee_code(dept_code: &str) -> String {
    format!("{dept_code}000")
}

/// First-round dates of the presidential elections covered.
pub const ELECTION_DATES: &[(i32, u32, u32)] = &[
    (1969, 6, 1),
    (1974, 5, 5),
    (1981, 4, 26),
    (1988, 4, 24),
    (1995, 4, 23),
    (2002, 4, 21),
    (2007, 4, 22),
    (2012, 4, 22),
    (2017, 4, 23),
    (2022, 4, 10),
];

pub fn election_date(year: i32) -> Option<NaiveDate> {
    ELECTION_DATES
        .iter()
        .find(|(y, _, _)| *y == year)
        .and_then(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d))
}

/// Ascending election years; the indicator alignment targets.
pub fn election_years() -> Vec<i32> {
    let mut years: Vec<i32> = ELECTION_DATES.iter().map(|(y, _, _)| *y).collect();
    years.sort_unstable();
    years
}

/// Sheet holding first-round results in every workbook.
pub const FIRST_ROUND_SHEET: &str = "Premier tour";

/// Per-department first-round workbooks. 2017 is only published per
/// polling station, see [`FIRST_ROUND_2017_BUREAU_TXT_URL`].
pub const FIRST_ROUND_XLSX_URLS: &[(i32, &str)] = &[
    (
        1969,
        "https://static.data.gouv.fr/resources/election-presidentielle-1969-resultats-par-departement/20220419-000314/france-politique.fr-presidentielle-1969.xlsx",
    ),
    (
        1974,
        "https://static.data.gouv.fr/resources/election-presidentielle-1974-resultats-par-departement/20160821-213008/France-politique.fr_Presidentielle_1974.xlsx",
    ),
    (
        1981,
        "https://static.data.gouv.fr/resources/election-presidentielle-1981-resultats-par-departement/20160821-213523/France-politique.fr_Presidentielle_1981.xlsx",
    ),
    (
        1988,
        "https://static.data.gouv.fr/resources/election-presidentielle-1988-resultats-par-departement/20160821-213723/France-politique.fr_Presidentielle_1988.xlsx",
    ),
    (
        1995,
        "https://static.data.gouv.fr/resources/election-presidentielle-1995-resultats-par-departement/20160821-213837/France-politique.fr_Presidentielle_1995.xlsx",
    ),
    (
        2002,
        "https://static.data.gouv.fr/resources/election-presidentielle-2002-resultats-par-departement/20160821-213930/France-politique.fr_Presidentielle_2002.xlsx",
    ),
    (
        2007,
        "https://static.data.gouv.fr/resources/election-presidentielle-2007-resultats-par-departement/20160821-214058/France-politique.fr_Presidentielle_2007.xlsx",
    ),
    (
        2012,
        "https://static.data.gouv.fr/resources/election-presidentielle-2012-resultats-par-departement/20160821-214241/France-politique.fr_Presidentielle_2012.xlsx",
    ),
    (
        2022,
        "https://static.data.gouv.fr/resources/election-presidentielle-2012-resultats-par-departement-1/20220414-215243/france-politique.fr-presidentielle-2022.xlsx",
    ),
];

pub const BALLOT_TEXT_YEAR: i32 = 2017;

pub const FIRST_ROUND_2017_BUREAU_TXT_URL: &str = "https://static.data.gouv.fr/resources/election-presidentielle-des-23-avril-et-7-mai-2017-resultats-definitifs-du-1er-tour-par-bureaux-de-vote/20170427-100955/PR17_BVot_T1_FE.txt";

pub const ODD_DEP_ZIP_URL: &str = "https://www.insee.fr/fr/statistiques/fichier/4505239/ODD_CSV.zip";
pub const ODD_DEP_FILENAME: &str = "ODD_DEP.csv";
pub const SOCIO_SOURCE_LABEL: &str =
    "INSEE - Indicateurs territoriaux de developpement durable (ODD_DEP)";

/// Every remote file the pipeline reads.
pub fn all_source_urls() -> Vec<&'static str> {
    FIRST_ROUND_XLSX_URLS
        .iter()
        .map(|(_, url)| *url)
        .chain([FIRST_ROUND_2017_BUREAU_TXT_URL, ODD_DEP_ZIP_URL])
        .collect()
}

/// One socio-economic indicator and where it lives in the ODD table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorSpec {
    pub indicator_code: &'static str,
    pub indicator_name: &'static str,
    pub unit: &'static str,
    pub variable: &'static str,
    /// `None` selects rows with a blank `sous_champ`.
    pub sous_champ: Option<&'static str>,
}

impl IndicatorSpec {
    /// Provenance label stored with every value of this indicator.
    pub fn source_label(&self) -> String {
        match self.sous_champ {
            Some(sous_champ) => format!(
                "{} (variable={},sous_champ={})",
                SOCIO_SOURCE_LABEL, self.variable, sous_champ
            ),
            None => format!("{} (variable={})", SOCIO_SOURCE_LABEL, self.variable),
        }
    }
}

pub const SOCIO_ECO_INDICATORS: &[IndicatorSpec] = &[
    IndicatorSpec {
        indicator_code: "unemployment_rate",
        indicator_name: "Taux de chomage BIT (15-64 ans)",
        unit: "%",
        variable: "taux_chom_bit",
        sous_champ: Some("total"),
    },
    IndicatorSpec {
        indicator_code: "poverty_rate",
        indicator_name: "Taux de pauvrete",
        unit: "%",
        variable: "taux_pvt",
        sous_champ: Some("total"),
    },
    IndicatorSpec {
        indicator_code: "median_standard_of_living",
        indicator_name: "Niveau de vie median",
        unit: "EUR",
        variable: "niveau_vie_median",
        sous_champ: None,
    },
    IndicatorSpec {
        indicator_code: "no_diploma_rate_20_24",
        indicator_name: "Part des 20-24 ans sortis d'etudes sans diplome",
        unit: "%",
        variable: "part_20_24_sortis_nondip",
        sous_champ: None,
    },
    IndicatorSpec {
        indicator_code: "social_housing_share",
        indicator_name: "Part des logements sociaux",
        unit: "%",
        variable: "part_pls",
        sous_champ: None,
    },
];

/// Turnout is also published as an indicator, fed from election results.
pub const TURNOUT_INDICATOR: IndicatorSpec = IndicatorSpec {
    indicator_code: "turnout_rate",
    indicator_name: "Taux de participation",
    unit: "%",
    variable: "turnout_rate",
    sous_champ: None,
};
pub const TURNOUT_INDICATOR_SOURCE: &str = "Resultats election data.gouv";
pub const TURNOUT_VALUE_SOURCE: &str = "data.gouv - presidentielle premier tour";
