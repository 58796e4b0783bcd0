use super::history::HistoryPoint;
use super::provider::{
    HistoryInterval, ProviderConfig, StockDataError, StockDataProvider, StockQuote,
};
use alpha_vantage::api::ApiClient;
use alpha_vantage::stock_time::StockFunction;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting state for Alpha Vantage API
#[derive(Debug)]
struct RateLimitState {
    requests_made: u32,
    window_start: Instant,
    requests_per_minute: u32,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            requests_made: 0,
            window_start: Instant::now(),
            requests_per_minute: 5, // Alpha Vantage free tier: 5 requests per minute
        }
    }
}

impl RateLimitState {
    /// Reserve a request slot, returning how long to wait before it may be sent
    fn reserve(&mut self, now: Instant) -> Option<Duration> {
        if now.duration_since(self.window_start) >= RATE_WINDOW {
            self.requests_made = 0;
            self.window_start = now;
        }

        if self.requests_made < self.requests_per_minute {
            self.requests_made += 1;
            return None;
        }

        // Window is full: the request opens the next window
        let wait = RATE_WINDOW.saturating_sub(now.duration_since(self.window_start));
        self.window_start = now + wait;
        self.requests_made = 1;
        Some(wait)
    }
}

/// Alpha Vantage stock data provider using the `alpha_vantage` crate
pub struct AlphaVantageProvider {
    client: Option<ApiClient>,
    rate_limit: Mutex<RateLimitState>,
}

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider
    pub fn new() -> Self {
        Self {
            client: None,
            rate_limit: Mutex::new(RateLimitState::default()),
        }
    }

    /// Wait for a free slot in the per-minute request budget.
    ///
    /// A sync cycle issues one request per symbol, so waiting keeps a large
    /// watchlist from failing the whole batch on the free tier.
    async fn throttle(&self) {
        let wait = {
            let mut rate_limit = self.rate_limit.lock().await;
            rate_limit.reserve(Instant::now())
        };

        if let Some(wait) = wait {
            log::debug!("Rate limit window full, waiting {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }

    /// Get the client, ensuring it's initialized
    fn get_client(&self) -> Result<&ApiClient, StockDataError> {
        self.client
            .as_ref()
            .ok_or_else(|| StockDataError::ConfigError("Provider not initialized".to_string()))
    }
}

fn stock_function(interval: HistoryInterval) -> StockFunction {
    match interval {
        HistoryInterval::Daily => StockFunction::Daily,
        HistoryInterval::Weekly => StockFunction::Weekly,
        HistoryInterval::Monthly => StockFunction::Monthly,
    }
}

/// Series keys look like `2024-01-05` (or carry a time suffix for intraday data)
fn parse_series_date(raw: &str) -> Option<NaiveDate> {
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

fn to_history(
    entries: impl Iterator<Item = (String, f64)>,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<HistoryPoint> {
    let mut points: Vec<HistoryPoint> = entries
        .filter_map(|(time, close)| {
            let day = parse_series_date(&time)?;
            if day < from || day > to {
                return None;
            }
            let timestamp_ms = day.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
            Some(HistoryPoint::new(timestamp_ms, close))
        })
        .collect();

    points.sort_by_key(|point| point.timestamp_ms);
    points
}

#[async_trait]
impl StockDataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    async fn initialize(&mut self, config: ProviderConfig) -> Result<(), StockDataError> {
        if config.api_key.is_empty() {
            return Err(StockDataError::InvalidApiKey(
                "API key is required".to_string(),
            ));
        }

        if let Some(rate_limit) = config.rate_limit {
            let mut rl = self.rate_limit.lock().await;
            rl.requests_per_minute = rate_limit.max(1);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| StockDataError::ConfigError(format!("HTTP client: {e}")))?;
        self.client = Some(ApiClient::set_api(&config.api_key, http_client));

        log::info!("Alpha Vantage provider initialized successfully");
        Ok(())
    }

    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, StockDataError> {
        let client = self.get_client()?;
        self.throttle().await;

        log::debug!("Fetching quote for symbol: {}", symbol);

        let quote = client.quote(symbol).json().await?;

        // An unknown symbol comes back as an empty quote rather than an error
        if quote.symbol().is_empty() {
            return Err(StockDataError::SymbolNotFound(symbol.to_string()));
        }

        Ok(StockQuote::new(
            quote.symbol(),
            quote.price(),
            quote.change(),
            quote.change_percent(),
        ))
    }

    async fn get_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: HistoryInterval,
    ) -> Result<Vec<HistoryPoint>, StockDataError> {
        let client = self.get_client()?;
        self.throttle().await;

        log::debug!("Fetching {interval:?} history for {symbol} from {from} to {to}");

        let series = client
            .stock_time(stock_function(interval), symbol)
            .json()
            .await?;

        let entries = series
            .data()
            .iter()
            .map(|entry| (entry.time().to_string(), entry.close()));

        Ok(to_history(entries, from, to))
    }
}
