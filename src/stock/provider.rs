use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use super::history::HistoryPoint;

/// Failures reported by a quote source
#[derive(Debug)]
pub enum StockDataError {
    InvalidApiKey(String),
    /// Transport failure; the request may succeed later
    NetworkError(String),
    RateLimitExceeded,
    /// The source has no data for this symbol
    SymbolNotFound(String),
    /// Any other answer the source gave that we could not use
    ProviderError(String),
    ConfigError(String),
}

impl StockDataError {
    /// True when retrying will not help because the symbol itself is unknown
    pub fn is_unresolvable_symbol(&self) -> bool {
        matches!(self, StockDataError::SymbolNotFound(_))
    }

    /// Sort a free-form upstream message into a variant.
    /// Transport and quota problems are checked first so they are never
    /// mistaken for an unknown symbol.
    fn classify(message: String) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("getrequestfailed") || lower.contains("connection") || lower.contains("network") {
            StockDataError::NetworkError(message)
        } else if lower.contains("call frequency") || lower.contains("premium") {
            StockDataError::RateLimitExceeded
        } else if lower.contains("api key") || lower.contains("apikey") {
            StockDataError::InvalidApiKey(message)
        } else if lower.contains("invalid api call") || lower.contains("symbol") || lower.contains("invaliddata") {
            StockDataError::SymbolNotFound(message)
        } else {
            StockDataError::ProviderError(message)
        }
    }
}

impl fmt::Display for StockDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockDataError::InvalidApiKey(msg) => write!(f, "API key rejected: {msg}"),
            StockDataError::NetworkError(msg) => write!(f, "Network error: {msg}"),
            StockDataError::RateLimitExceeded => f.write_str("Rate limit exceeded"),
            StockDataError::SymbolNotFound(symbol) => write!(f, "Symbol not found: {symbol}"),
            StockDataError::ProviderError(msg) => write!(f, "Quote source error: {msg}"),
            StockDataError::ConfigError(msg) => write!(f, "Provider misconfigured: {msg}"),
        }
    }
}

impl Error for StockDataError {}

impl From<alpha_vantage::error::Error> for StockDataError {
    fn from(error: alpha_vantage::error::Error) -> Self {
        // The crate reports most failures as free-form messages
        StockDataError::classify(format!("{error:?}"))
    }
}

/// Latest price for one symbol, as fetched
#[derive(Debug, Clone, PartialEq)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    /// Change from previous close, in currency units
    pub change: f64,
    /// Change from previous close, in percent
    pub change_percent: f64,
}

impl StockQuote {
    pub fn new(symbol: &str, price: f64, change: f64, change_percent: f64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            price,
            change,
            change_percent,
        }
    }

    pub fn previous_close(&self) -> f64 {
        self.price - self.change
    }
}

/// Sampling interval for historical closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryInterval {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Requests per minute; `None` keeps the provider's default
    pub rate_limit: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout: 30,
            rate_limit: None,
        }
    }
}

/// A remote source of quotes and price history
#[async_trait]
pub trait StockDataProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), StockDataError>;

    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, StockDataError>;

    /// Fetch quotes for several symbols in one logical call.
    ///
    /// Symbols the provider cannot resolve are absent from the returned map.
    /// Any other failure aborts the whole batch.
    async fn get_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, StockQuote>, StockDataError> {
        let mut quotes = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_quote(symbol).await {
                Ok(quote) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Err(e) if e.is_unresolvable_symbol() => {
                    log::warn!("No quote available for {symbol}: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(quotes)
    }

    /// Closes between `from` and `to` (inclusive), oldest first
    async fn get_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: HistoryInterval,
    ) -> Result<Vec<HistoryPoint>, StockDataError>;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(provider_type: &str) -> Result<Box<dyn StockDataProvider>, StockDataError> {
        match provider_type.to_lowercase().as_str() {
            "alpha_vantage" | "alphavantage" => {
                Ok(Box::new(super::alpha_vantage::AlphaVantageProvider::new()))
            }
            other => Err(StockDataError::ConfigError(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}
