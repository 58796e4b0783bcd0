use tokio::sync::RwLock;

use crate::stock::{ServiceError, StockService};

const EMPTY_WIDGET: &str = "No stocks to show";

/// Last rendered home-screen widget text.
///
/// Rebuilt from the quote store whenever a sync cycle writes data, so reads
/// never touch storage.
pub struct WidgetSnapshot {
    text: RwLock<String>,
}

impl Default for WidgetSnapshot {
    fn default() -> Self {
        Self {
            text: RwLock::new(EMPTY_WIDGET.to_string()),
        }
    }
}

impl WidgetSnapshot {
    pub async fn text(&self) -> String {
        self.text.read().await.clone()
    }

    pub async fn refresh(&self, service: &StockService) -> Result<(), ServiceError> {
        let text = service.widget_text().await?;
        *self.text.write().await = text;
        Ok(())
    }
}
