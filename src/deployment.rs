use log::{info, warn};
use std::env;
use teloxide::prelude::*;

#[cfg(feature = "axum-server")]
use axum::{Router, extract::State, response::Html, routing::get, routing::post};

use crate::config::AppConfig;
use crate::handlers::handle_message;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Webhook,
    Polling,
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Webhook => write!(f, "WEBHOOK (Production)"),
            DeploymentMode::Polling => write!(f, "POLLING (Development)"),
        }
    }
}

/// Hosting platforms that set these variables expect an HTTP server
const PLATFORM_MARKERS: [&str; 3] = ["RAILWAY_ENVIRONMENT", "HEROKU_APP_NAME", "VERCEL"];

fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> DeploymentMode {
    let is_set = |name: &str| lookup(name).is_some();
    let equals = |name: &str, expected: &str| lookup(name).is_some_and(|v| v == expected);

    let production = PLATFORM_MARKERS.iter().any(|&name| is_set(name))
        || equals("ENVIRONMENT", "production")
        || equals("DEPLOYMENT_ENV", "production")
        || (is_set("PORT") && is_set("WEBHOOK_URL"))
        || equals("WEBHOOK_MODE", "true");

    if production {
        DeploymentMode::Webhook
    } else {
        DeploymentMode::Polling
    }
}

pub fn detect_deployment_mode() -> DeploymentMode {
    detect_with(|name| env::var(name).ok())
}

#[cfg(feature = "axum-server")]
#[derive(Clone)]
struct WebState {
    bot: Bot,
    app: AppState,
}

#[cfg(feature = "axum-server")]
async fn health_check() -> Html<&'static str> {
    Html("<h1>Stock watch bot is running!</h1>")
}

#[cfg(feature = "axum-server")]
async fn widget(State(web): State<WebState>) -> String {
    web.app.widget.text().await
}

#[cfg(feature = "axum-server")]
async fn webhook_handler(
    State(web): State<WebState>,
    axum::Json(update): axum::Json<teloxide::types::Update>,
) -> &'static str {
    info!("🔗 Webhook received update: {:?}", update.id);

    match update.kind {
        teloxide::types::UpdateKind::Message(message) => {
            if let Err(e) = handle_message(web.bot, message, web.app).await {
                warn!("❌ Failed to handle webhook update: {e}");
            }
        }
        _ => info!("🔄 Received non-message update in webhook"),
    }
    "OK"
}

#[cfg(feature = "axum-server")]
fn router(bot: Bot, state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/widget", get(widget))
        .route("/webhook", post(webhook_handler))
        .with_state(WebState { bot, app: state })
}

#[cfg(feature = "axum-server")]
pub async fn run_webhook_mode(
    bot: Bot,
    state: AppState,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let webhook_url = config
        .webhook_url
        .as_deref()
        .ok_or("WEBHOOK_URL must be set for webhook mode")?;

    info!("🌐 Running in WEBHOOK mode, registering {webhook_url}");
    bot.set_webhook(webhook_url.parse()?)
        .await
        .map_err(|e| format!("Failed to set webhook: {e}"))?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {e}", config.port))?;

    info!("👂 Serving /, /widget and /webhook on port {}", config.port);
    axum::serve(listener, router(bot, state))
        .await
        .map_err(|e| format!("Server failed: {e}").into())
}

pub async fn run_polling_mode(bot: Bot, state: AppState) {
    info!("🔄 Running in POLLING mode");

    let handler = Update::filter_message().endpoint(handle_message);
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;
}
