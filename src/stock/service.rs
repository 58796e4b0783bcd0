use std::sync::Arc;

use super::database::{DatabaseError, QuoteRecord, QuoteStore, StorageUri};
use super::format::{EmptyState, format_widget};
use crate::preferences::{DisplayMode, Preferences, PreferencesError, normalize_symbol};
use crate::sync::{SyncDispatch, SyncScheduler};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What the watchlist view should show
#[derive(Debug, Clone, PartialEq)]
pub enum ListView {
    Quotes {
        records: Vec<QuoteRecord>,
        mode: DisplayMode,
    },
    Empty(EmptyState),
}

#[derive(Debug)]
pub enum AddOutcome {
    Accepted {
        symbol: String,
        newly_added: bool,
        dispatch: SyncDispatch,
    },
    Rejected,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Started(SyncDispatch),
    Offline,
}

/// Watchlist operations behind the chat commands
pub struct StockService {
    preferences: Arc<Preferences>,
    store: Arc<dyn QuoteStore>,
    scheduler: Arc<SyncScheduler>,
}

impl StockService {
    pub fn new(
        preferences: Arc<Preferences>,
        store: Arc<dyn QuoteStore>,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            preferences,
            store,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    /// Stored quotes in symbol order, or the reason there are none
    pub async fn list(&self) -> Result<ListView, ServiceError> {
        let records = self.store.query(&StorageUri::AllQuotes).await?;
        if !records.is_empty() {
            let mode = self.preferences.display_mode().await?;
            return Ok(ListView::Quotes { records, mode });
        }

        if !self.scheduler.has_connection().await {
            return Ok(ListView::Empty(EmptyState::NoNetwork));
        }
        if self.preferences.stocks().await?.is_empty() {
            return Ok(ListView::Empty(EmptyState::NoStocks));
        }
        Ok(ListView::Empty(EmptyState::Loading))
    }

    pub async fn detail(&self, symbol: &str) -> Result<Option<(QuoteRecord, DisplayMode)>, ServiceError> {
        let Some(symbol) = normalize_symbol(symbol) else {
            return Ok(None);
        };

        match self.store.query_symbol(&symbol).await? {
            Some(record) => Ok(Some((record, self.preferences.display_mode().await?))),
            None => Ok(None),
        }
    }

    /// Watch a symbol and sync right away (or as soon as the network is back)
    pub async fn add_stock(&self, raw: &str) -> Result<AddOutcome, ServiceError> {
        let Some(symbol) = normalize_symbol(raw) else {
            log::info!("Rejected malformed symbol '{raw}'");
            return Ok(AddOutcome::Rejected);
        };

        let newly_added = self.preferences.add_stock(&symbol).await?;
        log::info!("Watching {symbol} (new: {newly_added})");

        let dispatch = self.scheduler.sync_immediately().await;
        Ok(AddOutcome::Accepted {
            symbol,
            newly_added,
            dispatch,
        })
    }

    /// Stop watching a symbol and drop its stored quote.
    /// Returns whether the symbol was watched or stored.
    pub async fn remove_stock(&self, raw: &str) -> Result<bool, ServiceError> {
        let Some(symbol) = normalize_symbol(raw) else {
            return Ok(false);
        };

        let watched = self.preferences.remove_stock(&symbol).await?;
        let deleted = self.store.delete(&StorageUri::for_symbol(&symbol)).await?;
        log::info!("Removed {symbol} (watched: {watched}, rows deleted: {deleted})");
        Ok(watched || deleted > 0)
    }

    pub async fn toggle_display_mode(&self) -> Result<DisplayMode, ServiceError> {
        Ok(self.preferences.toggle_display_mode().await?)
    }

    /// Manual refresh; offline requests are not queued
    pub async fn refresh(&self) -> RefreshOutcome {
        if self.scheduler.has_connection().await {
            RefreshOutcome::Started(self.scheduler.sync_immediately().await)
        } else {
            RefreshOutcome::Offline
        }
    }

    pub async fn widget_text(&self) -> Result<String, ServiceError> {
        let records = self.store.query(&StorageUri::AllQuotes).await?;
        Ok(format_widget(&records))
    }
}
