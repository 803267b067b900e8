//! Runtime configuration from the environment.

use crate::error::{Error, Result};
use crate::extract::TargetDepartments;
use collector::DEFAULT_CACHE_DIR;
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;

pub const DEFAULT_DASHBOARD_OUTPUT: &str = "data/processed/dashboard/idf_dashboard.svg";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    /// Only needed to open a connection; offline runs work without it.
    pub password: Option<String>,
}

impl DbConfig {
    /// Connection options; fails when `DB_PASSWORD` was not set.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let password = self
            .password
            .as_deref()
            .ok_or(Error::MissingConfig("DB_PASSWORD"))?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(password))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub targets: TargetDepartments,
    pub align_socio_to_election_years: bool,
    pub cache_dir: PathBuf,
    pub dashboard_output: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; unset and empty are treated alike.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or_default = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let port = match var("DB_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidConfig {
                name: "DB_PORT",
                value: raw,
            })?,
            None => 5432,
        };

        let db = DbConfig {
            host: or_default("DB_HOST", "localhost"),
            port,
            name: or_default("DB_NAME", "mspr_electio"),
            user: or_default("DB_USER", "mspr"),
            password: var("DB_PASSWORD"),
        };

        let targets = match var("TARGET_DEPT_CODES") {
            Some(raw) => TargetDepartments::new(raw.split(',')),
            None => TargetDepartments::idf(),
        };
        if targets.is_empty() {
            return Err(Error::InvalidConfig {
                name: "TARGET_DEPT_CODES",
                value: var("TARGET_DEPT_CODES").unwrap_or_default(),
            });
        }

        let align_socio_to_election_years = var("ALIGN_SOCIO_TO_ELECTION_YEARS")
            .map(|raw| {
                matches!(
                    raw.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes"
                )
            })
            .unwrap_or(true);

        Ok(Self {
            db,
            targets,
            align_socio_to_election_years,
            cache_dir: PathBuf::from(or_default("CACHE_DIR", DEFAULT_CACHE_DIR)),
            dashboard_output: PathBuf::from(or_default("DASHBOARD_OUTPUT", DEFAULT_DASHBOARD_OUTPUT)),
        })
    }
}
