use std::collections::HashSet;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::RwLock;

use crate::stock::StockService;
use crate::sync::SyncEvents;
use crate::widget::WidgetSnapshot;

/// Chats that have talked to the bot since startup; they receive sync notices
#[derive(Default)]
pub struct KnownChats {
    chats: RwLock<HashSet<ChatId>>,
}

impl KnownChats {
    /// Returns true the first time a chat is seen
    pub async fn remember(&self, chat: ChatId) -> bool {
        self.chats.write().await.insert(chat)
    }

    pub async fn all(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.chats.read().await.iter().copied().collect();
        chats.sort_by_key(|chat| chat.0);
        chats
    }
}

/// Shared handles injected into every update handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StockService>,
    pub widget: Arc<WidgetSnapshot>,
    pub chats: Arc<KnownChats>,
    pub events: SyncEvents,
}
