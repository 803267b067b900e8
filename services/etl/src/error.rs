//! Error types for the `etl` crate.
//!
//! Unparseable cells are not errors: the normalizer yields `None` for them.
//! Everything here aborts the current stage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidConfig { name: &'static str, value: String },

    /// Required columns absent from a source; needs a human to look at the
    /// upstream format.
    #[error("unresolvable schema in {origin}: {detail}")]
    Schema { origin: String, detail: String },

    #[error("unexpected {origin} format, missing columns: {missing:?}")]
    Format {
        origin: String,
        missing: Vec<String>,
    },

    #[error("no rows extracted: {0}")]
    EmptyResult(String),

    #[error("unknown election year {0}")]
    UnknownElectionYear(i32),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("fetch error: {0}")]
    Fetch(#[from] collector::FetchError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
