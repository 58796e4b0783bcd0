use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::events::{SyncEvent, SyncEvents};
use super::host::{Job, JobOutcome};
use crate::preferences::{Preferences, PreferencesError};
use crate::stock::{
    DatabaseError, HistoryInterval, QuoteRecord, QuoteStore, StockDataError, StockDataProvider,
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to read watchlist: {0}")]
    Preferences(#[from] PreferencesError),

    #[error("quote batch failed: {0}")]
    QuoteBatch(StockDataError),

    #[error("failed to store quotes: {0}")]
    Store(#[from] DatabaseError),
}

/// Result of one sync cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub cycle_id: Uuid,
    pub written: usize,
    /// Symbol dropped from the watchlist because no quote was found
    pub invalid: Option<String>,
    /// Symbols kept but skipped because their history could not be fetched
    pub history_failures: Vec<String>,
}

impl SyncReport {
    fn empty(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            written: 0,
            invalid: None,
            history_failures: Vec::new(),
        }
    }
}

/// First day of a history window reaching `years` back from `to`
fn history_start(to: NaiveDate, years: u32) -> NaiveDate {
    years
        .checked_mul(12)
        .and_then(|months| to.checked_sub_months(Months::new(months)))
        .unwrap_or(NaiveDate::MIN)
}

/// Fetches quotes for the watchlist and replaces the stored rows
pub struct QuoteSyncJob {
    provider: Arc<dyn StockDataProvider>,
    preferences: Arc<Preferences>,
    store: Arc<dyn QuoteStore>,
    events: SyncEvents,
    history_years: u32,
}

impl QuoteSyncJob {
    pub fn new(
        provider: Arc<dyn StockDataProvider>,
        preferences: Arc<Preferences>,
        store: Arc<dyn QuoteStore>,
        events: SyncEvents,
        history_years: u32,
    ) -> Self {
        Self {
            provider,
            preferences,
            store,
            events,
            history_years,
        }
    }

    fn history_window(&self) -> (NaiveDate, NaiveDate) {
        let to = Utc::now().date_naive();
        (history_start(to, self.history_years), to)
    }

    /// Run one fetch-and-persist cycle over the current watchlist
    pub async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        let cycle_id = Uuid::new_v4();
        let symbols: Vec<String> = self.preferences.stocks().await?.into_iter().collect();

        if symbols.is_empty() {
            log::info!("Sync {cycle_id}: watchlist is empty, nothing to fetch");
            return Ok(SyncReport::empty(cycle_id));
        }

        log::info!("Sync {cycle_id}: fetching quotes for {} symbols", symbols.len());

        let quotes = match self.provider.get_quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                log::error!("Sync {cycle_id}: quote batch failed: {e}");
                return Err(SyncError::QuoteBatch(e));
            }
        };

        let (from, to) = self.history_window();
        let mut report = SyncReport::empty(cycle_id);
        let mut records = Vec::with_capacity(symbols.len());

        for symbol in &symbols {
            let Some(quote) = quotes.get(symbol) else {
                log::warn!("Sync {cycle_id}: no quote for {symbol}, removing it from the watchlist");
                match self.preferences.remove_stock(symbol).await {
                    Ok(_) => {
                        self.events.publish(SyncEvent::InvalidSymbol {
                            symbol: symbol.clone(),
                        });
                        report.invalid = Some(symbol.clone());
                    }
                    Err(e) => {
                        log::error!("Sync {cycle_id}: failed to remove {symbol}: {e}");
                    }
                }
                // Remaining symbols are skipped until the next cycle
                break;
            };

            match self
                .provider
                .get_history(symbol, from, to, HistoryInterval::Weekly)
                .await
            {
                Ok(history) => records.push(QuoteRecord::from_quote(symbol, quote, &history)),
                Err(e) => {
                    log::warn!("Sync {cycle_id}: history for {symbol} failed, skipping: {e}");
                    report.history_failures.push(symbol.clone());
                }
            }
        }

        report.written = self.store.bulk_insert(records).await?;
        log::info!("Sync {cycle_id}: wrote {} quotes", report.written);

        self.events.publish(SyncEvent::DataUpdated {
            cycle_id,
            written: report.written,
        });

        Ok(report)
    }
}

#[async_trait]
impl Job for QuoteSyncJob {
    async fn run(&self) -> JobOutcome {
        match self.run_cycle().await {
            Ok(_) => JobOutcome::Done,
            Err(SyncError::Preferences(e)) => {
                log::error!("Sync aborted, settings unavailable: {e}");
                JobOutcome::Done
            }
            Err(e) => {
                log::warn!("Sync cycle failed: {e}");
                JobOutcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::{DisplayMode, MemorySettings};
    use crate::stock::{MemoryQuoteStore, StockQuote};
    use crate::testing::{MockProvider, ReadOnlySettings};

    struct Fixture {
        job: QuoteSyncJob,
        preferences: Arc<Preferences>,
        store: Arc<MemoryQuoteStore>,
        events: SyncEvents,
    }

    fn fixture(provider: MockProvider, watchlist: &[&str]) -> Fixture {
        let defaults: Vec<String> = watchlist.iter().map(|s| s.to_string()).collect();
        let preferences = Arc::new(Preferences::new(Arc::new(MemorySettings::new()), &defaults));
        let store = Arc::new(MemoryQuoteStore::new());
        let events = SyncEvents::default();
        let job = QuoteSyncJob::new(
            Arc::new(provider),
            preferences.clone(),
            store.clone(),
            events.clone(),
            2,
        );
        Fixture {
            job,
            preferences,
            store,
            events,
        }
    }

    fn quotes(symbols: &[&str]) -> MockProvider {
        symbols
            .iter()
            .enumerate()
            .fold(MockProvider::new(), |provider, (i, symbol)| {
                let price = 100.0 + i as f64 * 10.0;
                provider.with_quote(StockQuote::new(symbol, price, 1.0 + i as f64, 0.5 + i as f64))
            })
    }

    #[tokio::test]
    async fn test_aapl_scenario() {
        let provider = MockProvider::new().with_quote(StockQuote::new("AAPL", 150.00, 2.00, 1.35));
        let f = fixture(provider, &["AAPL"]);

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.written, 1);
        let record = f.store.query_symbol("AAPL").await.unwrap().unwrap();
        assert_eq!(record.price, 150.00);
        assert_eq!(record.absolute_change, 2.00);
        assert_eq!(record.percentage_change, 1.35);
        assert!(!record.history_points().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_record_per_valid_symbol() {
        let symbols = ["AMZN", "GOOGL", "MSFT", "NVDA", "TSLA"];
        let provider = quotes(&symbols);
        let f = fixture(provider, &symbols);

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.written, symbols.len());
        assert!(report.invalid.is_none());

        let rows = f.store.query_all().await.unwrap();
        assert_eq!(rows.len(), symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let row = rows.iter().find(|r| r.symbol == *symbol).unwrap();
            assert_eq!(row.price, 100.0 + i as f64 * 10.0);
            assert_eq!(row.absolute_change, 1.0 + i as f64);
            assert_eq!(row.percentage_change, 0.5 + i as f64);
        }
    }

    #[tokio::test]
    async fn test_badsym_is_removed_and_not_written() {
        let f = fixture(MockProvider::new(), &["BADSYM"]);
        let mut events = f.events.subscribe();

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.invalid.as_deref(), Some("BADSYM"));
        assert_eq!(report.written, 0);
        assert!(f.store.query_symbol("BADSYM").await.unwrap().is_none());
        assert!(!f.preferences.stocks().await.unwrap().contains("BADSYM"));
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::InvalidSymbol {
                symbol: "BADSYM".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_symbol_stops_the_rest_of_the_cycle() {
        // Watchlist iterates in sorted order: AAPL, BADSYM, MSFT, TSLA
        let provider = quotes(&["AAPL", "MSFT", "TSLA"]);
        let f = fixture(provider, &["AAPL", "BADSYM", "MSFT", "TSLA"]);

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.invalid.as_deref(), Some("BADSYM"));
        assert_eq!(report.written, 1);
        assert!(f.store.query_symbol("AAPL").await.unwrap().is_some());
        assert!(f.store.query_symbol("MSFT").await.unwrap().is_none());
        assert!(f.store.query_symbol("TSLA").await.unwrap().is_none());

        // Valid symbols after the invalid one are still watched and picked up next cycle
        let watched = f.preferences.stocks().await.unwrap();
        assert!(watched.contains("MSFT") && watched.contains("TSLA"));

        let report = f.job.run_cycle().await.unwrap();
        assert_eq!(report.written, 3);
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_symbol_and_earlier_rows() {
        let preferences = Arc::new(Preferences::new(
            Arc::new(ReadOnlySettings::new(&["AAPL", "BADSYM", "MSFT"])),
            &[],
        ));
        let store = Arc::new(MemoryQuoteStore::new());
        let events = SyncEvents::default();
        let mut updates = events.subscribe();
        let job = QuoteSyncJob::new(
            Arc::new(quotes(&["AAPL", "MSFT"])),
            preferences.clone(),
            store.clone(),
            events,
            2,
        );

        let report = job.run_cycle().await.unwrap();

        assert!(report.invalid.is_none());
        assert_eq!(report.written, 1);
        assert!(store.query_symbol("AAPL").await.unwrap().is_some());
        assert!(preferences.stocks().await.unwrap().contains("BADSYM"));
        assert!(matches!(
            updates.recv().await.unwrap(),
            SyncEvent::DataUpdated { written: 1, .. }
        ));
    }

    #[test]
    fn test_history_start_saturates_for_huge_windows() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        assert_eq!(history_start(today, 2), NaiveDate::from_ymd_opt(2022, 3, 15).unwrap());
        assert_eq!(history_start(today, 0), today);
        assert_eq!(history_start(today, u32::MAX), NaiveDate::MIN);
        assert_eq!(history_start(today, 1_000_000), NaiveDate::MIN);
    }

    #[tokio::test]
    async fn test_history_failure_skips_only_that_symbol() {
        let provider = quotes(&["AAPL", "MSFT"]).failing_history("AAPL");
        let f = fixture(provider, &["AAPL", "MSFT"]);

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.history_failures, vec!["AAPL".to_string()]);
        assert!(f.store.query_symbol("AAPL").await.unwrap().is_none());
        assert!(f.store.query_symbol("MSFT").await.unwrap().is_some());
        assert!(f.preferences.stocks().await.unwrap().contains("AAPL"));
    }

    #[tokio::test]
    async fn test_quote_batch_failure_aborts_and_keeps_old_rows() {
        let f = fixture(quotes(&["AAPL"]).failing_quotes(), &["AAPL"]);
        f.store
            .bulk_insert(vec![crate::testing::record("AAPL", 99.0)])
            .await
            .unwrap();
        let mut events = f.events.subscribe();

        let result = f.job.run_cycle().await;

        assert!(matches!(result, Err(SyncError::QuoteBatch(_))));
        assert_eq!(f.store.query_symbol("AAPL").await.unwrap().unwrap().price, 99.0);
        assert!(events.try_recv().is_err());
        assert_eq!(f.job.run().await, JobOutcome::Retry);
    }

    #[tokio::test]
    async fn test_removed_symbol_is_not_reintroduced() {
        let f = fixture(quotes(&["AAPL", "MSFT"]), &["AAPL", "MSFT"]);
        f.job.run_cycle().await.unwrap();

        f.preferences.remove_stock("MSFT").await.unwrap();
        f.store.delete_symbol("MSFT").await.unwrap();
        f.job.run_cycle().await.unwrap();

        assert!(f.store.query_symbol("MSFT").await.unwrap().is_none());
        assert_eq!(f.store.query_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_display_mode_does_not_touch_records() {
        let f = fixture(quotes(&["AAPL"]), &["AAPL"]);
        f.job.run_cycle().await.unwrap();
        let before = f.store.query_all().await.unwrap();

        assert_eq!(f.preferences.toggle_display_mode().await.unwrap(), DisplayMode::Absolute);

        assert_eq!(f.store.query_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_empty_watchlist_writes_nothing() {
        let f = fixture(quotes(&["AAPL"]), &[]);
        let mut events = f.events.subscribe();

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(report.written, 0);
        assert!(events.try_recv().is_err());
        assert_eq!(f.job.run().await, JobOutcome::Done);
    }

    #[tokio::test]
    async fn test_data_updated_event() {
        let f = fixture(quotes(&["AAPL", "MSFT"]), &["AAPL", "MSFT"]);
        let mut events = f.events.subscribe();

        let report = f.job.run_cycle().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::DataUpdated {
                cycle_id: report.cycle_id,
                written: 2
            }
        );
    }
}
