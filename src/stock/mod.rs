//! Quote sources, local quote storage and the watchlist service.
pub mod alpha_vantage;
pub mod database;
pub mod dynamodb;
pub mod format;
pub mod history;
pub mod memory;
pub mod provider;
pub mod service;

pub use database::{DatabaseError, QuoteRecord, QuoteStore, StorageUri};
pub use dynamodb::DynamoDbQuoteStore;
pub use history::HistoryPoint;
pub use memory::MemoryQuoteStore;
pub use provider::{
    HistoryInterval, ProviderConfig, ProviderFactory, StockDataError, StockDataProvider,
    StockQuote,
};
pub use service::{AddOutcome, ListView, RefreshOutcome, ServiceError, StockService};
