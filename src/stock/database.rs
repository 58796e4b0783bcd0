use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::history::{HistoryParseError, HistoryPoint, parse_history, serialize_history};
use super::provider::StockQuote;

/// Latest snapshot for one watched symbol.
///
/// Table Name: `<prefix>_quotes`
/// Primary Key: symbol (String)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Stock symbol (Primary Key), upper-case
    pub symbol: String,

    /// Last traded price
    pub price: f64,

    /// Change from previous close, in currency units
    pub absolute_change: f64,

    /// Change from previous close, in percent (1.35 means 1.35%)
    pub percentage_change: f64,

    /// Serialized weekly closes, see [`crate::stock::history`]
    pub history: String,

    /// When this row was written
    pub updated_at: DateTime<Utc>,
}

impl QuoteRecord {
    /// Build a replace-row from a fetched quote and its history
    pub fn from_quote(symbol: &str, quote: &StockQuote, history: &[HistoryPoint]) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            price: quote.price,
            absolute_change: quote.change,
            percentage_change: quote.change_percent,
            history: serialize_history(history),
            updated_at: Utc::now(),
        }
    }

    pub fn history_points(&self) -> Result<Vec<HistoryPoint>, HistoryParseError> {
        parse_history(&self.history)
    }
}

/// Address of rows in the quote store, mirroring a content URI:
/// `quotes` for every row, `quotes/<SYMBOL>` for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    AllQuotes,
    Quote(String),
}

const QUOTES_PATH: &str = "quotes";

impl StorageUri {
    pub fn for_symbol(symbol: &str) -> Self {
        StorageUri::Quote(symbol.trim().to_uppercase())
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageUri::AllQuotes => write!(f, "{QUOTES_PATH}"),
            StorageUri::Quote(symbol) => write!(f, "{QUOTES_PATH}/{symbol}"),
        }
    }
}

impl FromStr for StorageUri {
    type Err = DatabaseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let path = raw.trim().trim_matches('/');
        match path.split_once('/') {
            None if path == QUOTES_PATH => Ok(StorageUri::AllQuotes),
            Some((QUOTES_PATH, symbol)) if !symbol.trim().is_empty() && !symbol.contains('/') => {
                Ok(StorageUri::for_symbol(symbol))
            }
            _ => Err(DatabaseError::ValidationError(format!("Unknown URI: {raw}"))),
        }
    }
}

/// Row store for quote snapshots, shared by the sync job and the presentation layer
#[async_trait::async_trait]
pub trait QuoteStore: Send + Sync {
    /// Every row, ordered by symbol
    async fn query_all(&self) -> Result<Vec<QuoteRecord>, DatabaseError>;

    async fn query_symbol(&self, symbol: &str) -> Result<Option<QuoteRecord>, DatabaseError>;

    /// Write all rows in one operation, replacing any existing row per symbol.
    /// Returns the number of rows written.
    async fn bulk_insert(&self, records: Vec<QuoteRecord>) -> Result<usize, DatabaseError>;

    /// Returns whether a row existed
    async fn delete_symbol(&self, symbol: &str) -> Result<bool, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;

    async fn query(&self, uri: &StorageUri) -> Result<Vec<QuoteRecord>, DatabaseError> {
        match uri {
            StorageUri::AllQuotes => self.query_all().await,
            StorageUri::Quote(symbol) => Ok(self.query_symbol(symbol).await?.into_iter().collect()),
        }
    }

    /// Returns the number of rows removed
    async fn delete(&self, uri: &StorageUri) -> Result<usize, DatabaseError> {
        match uri {
            StorageUri::AllQuotes => {
                let mut removed = 0;
                for record in self.query_all().await? {
                    if self.delete_symbol(&record.symbol).await? {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
            StorageUri::Quote(symbol) => Ok(usize::from(self.delete_symbol(symbol).await?)),
        }
    }
}

/// Database error types
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
