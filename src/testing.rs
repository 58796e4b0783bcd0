//! Hand-written doubles shared by the unit tests.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use teloxide::types::ChatId;
use tokio::sync::Mutex as AsyncMutex;

use crate::listener::Notifier;
use crate::network::NetworkProbe;
use crate::preferences::{
    MemorySettings, Preferences, PreferencesError, SettingsBackend, SettingsSnapshot,
};
use crate::state::{AppState, KnownChats};
use crate::stock::{
    HistoryInterval, HistoryPoint, MemoryQuoteStore, ProviderConfig, QuoteRecord, StockDataError,
    StockDataProvider, StockQuote, StockService,
};
use crate::sync::{
    Job, JobId, JobOutcome, JobScheduler, JobSpec, QuoteSyncJob, ScheduleConfig, SyncEvents,
    SyncScheduler,
};
use crate::widget::WidgetSnapshot;

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Quote source backed by a fixed table of quotes
#[derive(Default)]
pub struct MockProvider {
    quotes: Mutex<HashMap<String, StockQuote>>,
    failing_history: Mutex<HashSet<String>>,
    fail_quotes: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, quote: StockQuote) -> Self {
        self.add_quote(quote);
        self
    }

    pub fn add_quote(&self, quote: StockQuote) {
        self.quotes
            .lock()
            .unwrap()
            .insert(quote.symbol.clone(), quote);
    }

    /// Every quote lookup fails with a network error
    pub fn failing_quotes(self) -> Self {
        self.fail_quotes.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_history(self, symbol: &str) -> Self {
        self.failing_history
            .lock()
            .unwrap()
            .insert(symbol.to_uppercase());
        self
    }
}

#[async_trait]
impl StockDataProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn initialize(&mut self, _config: ProviderConfig) -> Result<(), StockDataError> {
        Ok(())
    }

    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, StockDataError> {
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(StockDataError::NetworkError("connection reset".to_string()));
        }

        self.quotes
            .lock()
            .unwrap()
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| StockDataError::SymbolNotFound(symbol.to_string()))
    }

    async fn get_history(
        &self,
        symbol: &str,
        _from: NaiveDate,
        _to: NaiveDate,
        _interval: HistoryInterval,
    ) -> Result<Vec<HistoryPoint>, StockDataError> {
        if self.failing_history.lock().unwrap().contains(&symbol.to_uppercase()) {
            return Err(StockDataError::NetworkError(format!("history for {symbol} timed out")));
        }

        let start = Utc::now().timestamp_millis() - 4 * WEEK_MS;
        Ok((0..4)
            .map(|week| HistoryPoint::new(start + week * WEEK_MS, 100.0 + week as f64))
            .collect())
    }
}

/// Reachability switch flipped by the test
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn has_connection(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Host scheduler that only records what it was asked to run
#[derive(Default)]
pub struct RecordingScheduler {
    specs: AsyncMutex<Vec<JobSpec>>,
}

impl RecordingScheduler {
    pub async fn scheduled(&self) -> Vec<JobSpec> {
        self.specs.lock().await.clone()
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule(&self, spec: JobSpec, _job: Arc<dyn Job>) {
        self.specs.lock().await.push(spec);
    }

    async fn cancel(&self, id: JobId) -> bool {
        let mut specs = self.specs.lock().await;
        let before = specs.len();
        specs.retain(|spec| spec.id != id);
        specs.len() != before
    }

    async fn is_pending(&self, id: JobId) -> bool {
        self.specs.lock().await.iter().any(|spec| spec.id == id)
    }
}

/// Asks for a retry `fail_times` times, then succeeds
pub struct CountingJob {
    runs: AtomicU32,
    fail_times: u32,
}

impl CountingJob {
    pub fn new(fail_times: u32) -> Self {
        Self {
            runs: AtomicU32::new(0),
            fail_times,
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for CountingJob {
    async fn run(&self) -> JobOutcome {
        let previous = self.runs.fetch_add(1, Ordering::SeqCst);
        if previous < self.fail_times {
            JobOutcome::Retry
        } else {
            JobOutcome::Done
        }
    }
}

/// Collects outgoing chat messages
#[derive(Default)]
pub struct RecordingNotifier {
    sent: AsyncMutex<Vec<(ChatId, String)>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, chat: ChatId, text: String) {
        self.sent.lock().await.push((chat, text));
    }
}

/// Stored row with flat changes and no history
pub fn record(symbol: &str, price: f64) -> QuoteRecord {
    QuoteRecord {
        symbol: symbol.to_uppercase(),
        price,
        absolute_change: 0.0,
        percentage_change: 0.0,
        history: String::new(),
        updated_at: Utc::now(),
    }
}

/// Unique path under the system temp directory
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("stock_watch-{}-{}", uuid::Uuid::new_v4(), name))
}

/// Fully wired in-memory application with a recording host scheduler
pub struct TestApp {
    pub provider: Arc<MockProvider>,
    pub preferences: Arc<Preferences>,
    pub store: Arc<MemoryQuoteStore>,
    pub probe: Arc<StaticProbe>,
    pub host: Arc<RecordingScheduler>,
    pub events: SyncEvents,
    pub service: Arc<StockService>,
    pub widget: Arc<WidgetSnapshot>,
    pub chats: Arc<KnownChats>,
}

impl TestApp {
    pub fn new(online: bool, watchlist: &[&str]) -> Self {
        let defaults: Vec<String> = watchlist.iter().map(|s| s.to_string()).collect();
        let provider = Arc::new(MockProvider::new());
        let preferences = Arc::new(Preferences::new(Arc::new(MemorySettings::new()), &defaults));
        let store = Arc::new(MemoryQuoteStore::new());
        let probe = Arc::new(StaticProbe::new(online));
        let host = Arc::new(RecordingScheduler::default());
        let events = SyncEvents::default();

        let job = Arc::new(QuoteSyncJob::new(
            provider.clone(),
            preferences.clone(),
            store.clone(),
            events.clone(),
            2,
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            job,
            host.clone(),
            probe.clone(),
            ScheduleConfig::default(),
        ));
        let service = Arc::new(StockService::new(preferences.clone(), store.clone(), scheduler));

        Self {
            provider,
            preferences,
            store,
            probe,
            host,
            events,
            service,
            widget: Arc::new(WidgetSnapshot::default()),
            chats: Arc::new(KnownChats::default()),
        }
    }

    pub fn with_quote(self, quote: StockQuote) -> Self {
        self.provider.add_quote(quote);
        self
    }

    pub fn state(&self) -> AppState {
        AppState {
            service: self.service.clone(),
            widget: self.widget.clone(),
            chats: self.chats.clone(),
            events: self.events.clone(),
        }
    }
}

/// Settings backend whose writes always fail
pub struct ReadOnlySettings {
    snapshot: SettingsSnapshot,
}

impl ReadOnlySettings {
    pub fn new(stocks: &[&str]) -> Self {
        Self {
            snapshot: SettingsSnapshot {
                initialized: true,
                stocks: stocks.iter().map(|s| s.to_string()).collect(),
                ..SettingsSnapshot::default()
            },
        }
    }
}

#[async_trait]
impl SettingsBackend for ReadOnlySettings {
    fn name(&self) -> &str {
        "read-only"
    }

    async fn load(&self) -> Result<Option<SettingsSnapshot>, PreferencesError> {
        Ok(Some(self.snapshot.clone()))
    }

    async fn save(&self, _snapshot: &SettingsSnapshot) -> Result<(), PreferencesError> {
        Err(PreferencesError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "settings are read-only",
        )))
    }
}
