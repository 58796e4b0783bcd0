use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sync::{BackoffPolicy, ScheduleConfig};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Where settings and quote rows are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// JSON files on local disk
    Local,
    DynamoDb,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "file" => Ok(StorageBackend::Local),
            "dynamodb" | "dynamo" => Ok(StorageBackend::DynamoDb),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub alpha_vantage_api_key: String,
    /// Requests per minute allowed by the quote API
    pub rate_limit: u32,
    pub schedule: ScheduleConfig,
    pub history_years: u32,
    pub default_stocks: Vec<String>,
    pub storage: StorageBackend,
    pub settings_path: PathBuf,
    pub quotes_path: PathBuf,
    pub table_prefix: String,
    pub reachability_url: String,
    pub probe_interval: Duration,
    pub webhook_url: Option<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        fn parsed<T: FromStr>(
            name: &'static str,
            raw: Option<String>,
            default: T,
        ) -> Result<T, ConfigError> {
            match raw {
                None => Ok(default),
                Some(value) => value
                    .parse()
                    .map_err(|_| ConfigError::Invalid { name, value }),
            }
        }

        let alpha_vantage_api_key =
            get("ALPHA_VANTAGE_API_KEY").ok_or(ConfigError::Missing("ALPHA_VANTAGE_API_KEY"))?;

        let period = parsed("SYNC_INTERVAL_SECS", get("SYNC_INTERVAL_SECS"), 300u64)?;
        let initial_backoff = parsed("INITIAL_BACKOFF_MS", get("INITIAL_BACKOFF_MS"), 10_000u64)?;
        let max_backoff = parsed("MAX_BACKOFF_SECS", get("MAX_BACKOFF_SECS"), 5 * 60 * 60u64)?;
        if period == 0 {
            return Err(ConfigError::Invalid {
                name: "SYNC_INTERVAL_SECS",
                value: period.to_string(),
            });
        }

        let default_stocks = get("DEFAULT_STOCKS")
            .unwrap_or_else(|| "AAPL,GOOGL,MSFT,AMZN".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let storage = match get("STORAGE_BACKEND") {
            None => StorageBackend::Local,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "STORAGE_BACKEND",
                value,
            })?,
        };

        Ok(Self {
            alpha_vantage_api_key,
            rate_limit: parsed("ALPHA_VANTAGE_RATE_LIMIT", get("ALPHA_VANTAGE_RATE_LIMIT"), 5)?,
            schedule: ScheduleConfig {
                period: Duration::from_secs(period),
                backoff: BackoffPolicy::exponential(
                    Duration::from_millis(initial_backoff),
                    Duration::from_secs(max_backoff),
                ),
            },
            history_years: parsed("HISTORY_YEARS", get("HISTORY_YEARS"), 2)?,
            default_stocks,
            storage,
            settings_path: get("SETTINGS_PATH")
                .unwrap_or_else(|| "data/settings.json".to_string())
                .into(),
            quotes_path: get("QUOTES_PATH")
                .unwrap_or_else(|| "data/quotes.json".to_string())
                .into(),
            table_prefix: get("DYNAMODB_TABLE_PREFIX").unwrap_or_else(|| "stock_watch".to_string()),
            reachability_url: get("REACHABILITY_URL")
                .unwrap_or_else(|| "https://www.alphavantage.co".to_string()),
            probe_interval: Duration::from_secs(parsed(
                "PROBE_INTERVAL_SECS",
                get("PROBE_INTERVAL_SECS"),
                15,
            )?),
            webhook_url: get("WEBHOOK_URL"),
            port: parsed("PORT", get("PORT"), 8080)?,
        })
    }
}
