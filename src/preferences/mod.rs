/// Watchlist and display settings
pub mod dynamodb;
pub mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use dynamodb::{DynamoDbSettings, client_from_env};
pub use file::JsonFileSettings;

/// How price changes are shown next to each quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Absolute,
    #[default]
    Percentage,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Absolute => DisplayMode::Percentage,
            DisplayMode::Percentage => DisplayMode::Absolute,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Absolute => "absolute",
            DisplayMode::Percentage => "percentage",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "absolute" => Some(DisplayMode::Absolute),
            "percentage" => Some(DisplayMode::Percentage),
            _ => None,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a settings backend persists
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Set once the default watchlist has been seeded
    pub initialized: bool,
    pub stocks: BTreeSet<String>,
    #[serde(default)]
    pub display_mode: DisplayMode,
}

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Raw key-value persistence behind [`Preferences`]
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when nothing has been stored yet
    async fn load(&self) -> Result<Option<SettingsSnapshot>, PreferencesError>;

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), PreferencesError>;
}

/// Non-persistent backend
#[derive(Default)]
pub struct MemorySettings {
    snapshot: Mutex<Option<SettingsSnapshot>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for MemorySettings {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Option<SettingsSnapshot>, PreferencesError> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), PreferencesError> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

/// Trim and upper-case a user supplied ticker, rejecting anything that
/// cannot be a symbol.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 12
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    valid.then_some(symbol)
}

/// Single access point for settings.
///
/// The UI and the sync job both edit the watchlist; every read-modify-write
/// runs under one lock so concurrent edits are applied one at a time.
pub struct Preferences {
    backend: Arc<dyn SettingsBackend>,
    default_stocks: BTreeSet<String>,
    write_lock: Mutex<()>,
}

impl Preferences {
    pub fn new(backend: Arc<dyn SettingsBackend>, default_stocks: &[String]) -> Self {
        let default_stocks = default_stocks
            .iter()
            .filter_map(|s| normalize_symbol(s))
            .collect();

        Self {
            backend,
            default_stocks,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Load the snapshot, seeding the default watchlist on first use.
    /// Callers must hold `write_lock`.
    async fn load_seeded(&self) -> Result<SettingsSnapshot, PreferencesError> {
        match self.backend.load().await? {
            Some(snapshot) if snapshot.initialized => Ok(snapshot),
            existing => {
                let snapshot = SettingsSnapshot {
                    initialized: true,
                    stocks: self.default_stocks.clone(),
                    display_mode: existing.map(|s| s.display_mode).unwrap_or_default(),
                };
                self.backend.save(&snapshot).await?;
                log::info!(
                    "Seeded watchlist with {} default symbols",
                    snapshot.stocks.len()
                );
                Ok(snapshot)
            }
        }
    }

    async fn update<T>(
        &self,
        edit: impl FnOnce(&mut SettingsSnapshot) -> T,
    ) -> Result<T, PreferencesError> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load_seeded().await?;
        let before = snapshot.clone();
        let result = edit(&mut snapshot);
        if snapshot != before {
            self.backend.save(&snapshot).await?;
        }
        Ok(result)
    }

    /// Current watchlist, sorted
    pub async fn stocks(&self) -> Result<BTreeSet<String>, PreferencesError> {
        let _guard = self.write_lock.lock().await;
        Ok(self.load_seeded().await?.stocks)
    }

    /// Returns false if the symbol was already watched
    pub async fn add_stock(&self, symbol: &str) -> Result<bool, PreferencesError> {
        let symbol = symbol.to_uppercase();
        self.update(|s| s.stocks.insert(symbol)).await
    }

    /// Returns false if the symbol was not watched
    pub async fn remove_stock(&self, symbol: &str) -> Result<bool, PreferencesError> {
        let symbol = symbol.to_uppercase();
        self.update(|s| s.stocks.remove(&symbol)).await
    }

    pub async fn display_mode(&self) -> Result<DisplayMode, PreferencesError> {
        let _guard = self.write_lock.lock().await;
        Ok(self.load_seeded().await?.display_mode)
    }

    /// Flip the display mode and return the new one
    pub async fn toggle_display_mode(&self) -> Result<DisplayMode, PreferencesError> {
        self.update(|s| {
            s.display_mode = s.display_mode.toggled();
            s.display_mode
        })
        .await
    }
}
