use postgres::{Client, NoTls};

use issuesync_core::{Error, PullOptions, Result, MAX_PAGE_SIZE};

use crate::error::storage_err;

pub const URL_ENV: &str = "ISSUESYNC_POSTGRES_URL";
pub const PAGE_SIZE_ENV: &str = "ISSUESYNC_PAGE_SIZE";
pub const PULL_ATTEMPTS_ENV: &str = "ISSUESYNC_PULL_ATTEMPTS";

/// Connection settings and pull tuning for the postgres backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PgConfig {
    pub url: String,
    pub options: PullOptions,
}

impl PgConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = var(URL_ENV)
            .ok_or_else(|| Error::InvalidOperation(format!("{URL_ENV} is not set")))?;

        let mut options = PullOptions::default();
        if let Some(raw) = var(PAGE_SIZE_ENV) {
            options.page_size = parse_bounded(PAGE_SIZE_ENV, &raw, 1, MAX_PAGE_SIZE)?;
        }
        if let Some(raw) = var(PULL_ATTEMPTS_ENV) {
            options.max_attempts = parse_bounded(PULL_ATTEMPTS_ENV, &raw, 1, 100)?;
        }

        Ok(Self { url, options })
    }

    pub fn connect(&self) -> Result<Client> {
        Client::connect(&self.url, NoTls).map_err(storage_err)
    }
}

fn parse_bounded<T>(name: &str, raw: &str, min: T, max: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    match raw.parse::<T>() {
        Ok(v) if v >= min && v <= max => Ok(v),
        _ => Err(Error::InvalidOperation(format!(
            "{name} must be an integer in {min}..={max}, got {raw:?}"
        ))),
    }
}
