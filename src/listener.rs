use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::state::AppState;
use crate::stock::format::format_invalid_symbol_notice;
use crate::sync::SyncEvent;

/// Outgoing chat message sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, chat: ChatId, text: String);
}

#[async_trait]
impl Notifier for Bot {
    async fn notify(&self, chat: ChatId, text: String) {
        if let Err(e) = self.send_message(chat, text).await {
            warn!("❌ Failed to notify chat {chat}: {e}");
        }
    }
}

async fn handle_event(state: &AppState, notifier: &dyn Notifier, event: SyncEvent) {
    match event {
        SyncEvent::DataUpdated { cycle_id, written } => {
            info!("🔄 Sync {cycle_id} wrote {written} quotes, refreshing widget");
            if let Err(e) = state.widget.refresh(&state.service).await {
                warn!("❌ Widget refresh failed: {e}");
            }
        }
        SyncEvent::InvalidSymbol { symbol } => {
            let notice = format_invalid_symbol_notice(&symbol);
            for chat in state.chats.all().await {
                notifier.notify(chat, notice.clone()).await;
            }
        }
    }
}

/// Reacts to sync events until the event channel closes
pub fn spawn_event_listener(state: AppState, notifier: Arc<dyn Notifier>) -> JoinHandle<()> {
    let mut events = state.events.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => handle_event(&state, notifier.as_ref(), event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Event listener fell behind, {skipped} sync events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("👋 Sync event listener stopped");
    })
}
