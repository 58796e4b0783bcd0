use log::{error, info, warn};
use std::error::Error;
use std::sync::Arc;
use teloxide::prelude::*;

mod commands;
mod config;
mod deployment;
mod handlers;
mod listener;
mod network;
mod preferences;
mod state;
mod stock;
mod sync;
#[cfg(test)]
mod testing;
mod widget;

use config::{AppConfig, StorageBackend};
use deployment::{DeploymentMode, detect_deployment_mode, run_polling_mode};
use network::HttpProbe;
use preferences::{DynamoDbSettings, JsonFileSettings, Preferences, SettingsBackend, client_from_env};
use state::{AppState, KnownChats};
use stock::{
    DynamoDbQuoteStore, MemoryQuoteStore, ProviderConfig, ProviderFactory, QuoteStore,
    StockDataProvider, StockService,
};
use sync::{QuoteSyncJob, SyncEvents, SyncScheduler, TokioJobScheduler};
use widget::WidgetSnapshot;

#[cfg(feature = "axum-server")]
use deployment::run_webhook_mode;

async fn build_provider(config: &AppConfig) -> Result<Arc<dyn StockDataProvider>, Box<dyn Error>> {
    let mut provider = ProviderFactory::create("alpha_vantage")?;
    provider
        .initialize(ProviderConfig {
            api_key: config.alpha_vantage_api_key.clone(),
            rate_limit: Some(config.rate_limit),
            ..ProviderConfig::default()
        })
        .await?;
    info!("📈 Quote provider: {}", provider.name());
    Ok(Arc::from(provider))
}

async fn build_storage(
    config: &AppConfig,
) -> Result<(Arc<dyn SettingsBackend>, Arc<dyn QuoteStore>), Box<dyn Error>> {
    match config.storage {
        StorageBackend::Local => {
            let settings: Arc<dyn SettingsBackend> =
                Arc::new(JsonFileSettings::new(&config.settings_path));
            let store: Arc<dyn QuoteStore> =
                Arc::new(MemoryQuoteStore::open(&config.quotes_path).await?);
            Ok((settings, store))
        }
        StorageBackend::DynamoDb => {
            let client = client_from_env().await;
            let settings: Arc<dyn SettingsBackend> =
                Arc::new(DynamoDbSettings::new(client.clone(), &config.table_prefix));
            let store: Arc<dyn QuoteStore> =
                Arc::new(DynamoDbQuoteStore::new(client, config.table_prefix.clone()));
            Ok((settings, store))
        }
    }
}

async fn build_state(config: &AppConfig) -> Result<AppState, Box<dyn Error>> {
    let provider = build_provider(config).await?;
    let (settings, store) = build_storage(config).await?;

    if let Err(e) = store.health_check().await {
        warn!("⚠️ Quote store health check failed: {e}");
    }

    let preferences = Arc::new(Preferences::new(settings, &config.default_stocks));
    info!("⚙️ Settings backend: {}", preferences.backend_name());

    let probe = Arc::new(HttpProbe::new(
        config.reachability_url.clone(),
        std::time::Duration::from_secs(5),
    )?);
    let host = Arc::new(TokioJobScheduler::new(probe.clone(), config.probe_interval));
    let events = SyncEvents::default();

    let job = Arc::new(QuoteSyncJob::new(
        provider,
        preferences.clone(),
        store.clone(),
        events.clone(),
        config.history_years,
    ));
    let scheduler = Arc::new(SyncScheduler::new(job, host, probe, config.schedule));
    let service = Arc::new(StockService::new(preferences, store, scheduler));

    let widget = Arc::new(WidgetSnapshot::default());
    if let Err(e) = widget.refresh(&service).await {
        warn!("⚠️ Initial widget render failed: {e}");
    }

    Ok(AppState {
        service,
        widget,
        chats: Arc::new(KnownChats::default()),
        events,
    })
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let state = build_state(&config).await?;

    let bot = Bot::from_env();
    listener::spawn_event_listener(state.clone(), Arc::new(bot.clone()));

    if state.service.scheduler().initialize().await.is_some() {
        info!("⏱️ Quote sync scheduled every {:?}", config.schedule.period);
    }

    let deployment_mode = detect_deployment_mode();
    info!("🚀 Bot deployment detection: {deployment_mode}");

    match deployment_mode {
        DeploymentMode::Webhook => {
            #[cfg(feature = "axum-server")]
            {
                run_webhook_mode(bot, state, &config).await
            }
            #[cfg(not(feature = "axum-server"))]
            {
                Err("Production environment detected but axum-server feature not enabled. Compile with --features axum-server".into())
            }
        }
        DeploymentMode::Polling => {
            run_polling_mode(bot, state).await;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();
    info!("Starting stock watch bot...");

    if let Err(e) = run().await {
        error!("Bot failed to start: {e}");
        std::process::exit(1);
    }
}
