use super::{DisplayMode, PreferencesError, SettingsBackend, SettingsSnapshot};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoDbClient};
use log::{info, warn};
use std::collections::HashMap;

/// Settings stored as a single DynamoDB item
///
/// Table Name: `<prefix>_settings`
/// Primary Key: settings_id (String)
pub struct DynamoDbSettings {
    client: DynamoDbClient,
    table_name: String,
    settings_id: String,
}

impl DynamoDbSettings {
    pub fn new(client: DynamoDbClient, table_prefix: &str) -> Self {
        Self {
            client,
            table_name: format!("{table_prefix}_settings"),
            settings_id: "default".to_string(),
        }
    }
}

/// Client built from the ambient AWS configuration (env, profile, IMDS)
pub async fn client_from_env() -> DynamoDbClient {
    let config = aws_config::defaults(BehaviorVersion::v2025_01_17())
        .load()
        .await;
    info!("🗃️ DynamoDB client configured for region {:?}", config.region());
    DynamoDbClient::new(&config)
}

fn snapshot_to_item(settings_id: &str, snapshot: &SettingsSnapshot) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("settings_id".to_string(), AttributeValue::S(settings_id.to_string()));
    item.insert("initialized".to_string(), AttributeValue::Bool(snapshot.initialized));
    // A list rather than a string set: DynamoDB rejects empty sets
    item.insert(
        "stocks".to_string(),
        AttributeValue::L(
            snapshot
                .stocks
                .iter()
                .map(|s| AttributeValue::S(s.clone()))
                .collect(),
        ),
    );
    item.insert(
        "display_mode".to_string(),
        AttributeValue::S(snapshot.display_mode.as_str().to_string()),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(chrono::Utc::now().to_rfc3339()),
    );
    item
}

fn item_to_snapshot(item: &HashMap<String, AttributeValue>) -> SettingsSnapshot {
    let initialized = item
        .get("initialized")
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false);

    let stocks = item
        .get("stocks")
        .and_then(|v| v.as_l().ok())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_s().ok())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let display_mode = match item.get("display_mode").and_then(|v| v.as_s().ok()) {
        Some(raw) => DisplayMode::parse(raw).unwrap_or_else(|| {
            warn!("⚠️ Unknown display mode '{raw}', using default");
            DisplayMode::default()
        }),
        None => DisplayMode::default(),
    };

    SettingsSnapshot {
        initialized,
        stocks,
        display_mode,
    }
}

#[async_trait]
impl SettingsBackend for DynamoDbSettings {
    fn name(&self) -> &str {
        "dynamodb"
    }

    async fn load(&self) -> Result<Option<SettingsSnapshot>, PreferencesError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("settings_id", AttributeValue::S(self.settings_id.clone()))
            .send()
            .await
            .map_err(|e| PreferencesError::DynamoDb(format!("{e:?}")))?;

        match result.item {
            Some(item) => Ok(Some(item_to_snapshot(&item))),
            None => {
                info!("🔍 No settings stored yet in {}", self.table_name);
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), PreferencesError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(snapshot_to_item(&self.settings_id, snapshot)))
            .send()
            .await
            .map_err(|e| PreferencesError::DynamoDb(format!("{e:?}")))?;

        info!("💾 Saved settings ({} symbols, {} mode)", snapshot.stocks.len(), snapshot.display_mode);
        Ok(())
    }
}
