//! ETL core for the Île-de-France presidential elections warehouse.
//!
//! Responsibilities:
//! - Normalize text, numbers and department codes from heterogeneous sources
//! - Extract first-round results from spreadsheets and ballot-level text
//! - Extract socio-economic indicators from the INSEE ODD archive
//! - Consolidate results and align indicators onto election years
//! - Load everything idempotently into Postgres
//!
//! Same sources + same configuration = same stored rows.

pub mod align;
pub mod catalog;
pub mod columns;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod extract;
pub mod load;
pub mod model;
pub mod normalize;
pub mod pipeline;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{ElectionResultRow, IndicatorValueRow};
