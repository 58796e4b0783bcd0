use super::database::{DatabaseError, QuoteRecord, QuoteStore};
use aws_sdk_dynamodb::{
    types::{AttributeValue, PutRequest, WriteRequest},
    Client as DynamoClient,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::sync::BackoffPolicy;

/// DynamoDB limits a BatchWriteItem request to 25 items
const BATCH_WRITE_LIMIT: usize = 25;

/// Resend rounds for unprocessed items before the write is reported as failed
const MAX_UNPROCESSED_RETRIES: u32 = 5;

/// Delay before resending unprocessed items after `round` (0-based) came back
/// throttled, or `None` once the retries are used up
fn unprocessed_retry_delay(round: u32) -> Option<Duration> {
    (round < MAX_UNPROCESSED_RETRIES).then(|| {
        BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(5))
            .delay_for(round)
    })
}

/// DynamoDB implementation of QuoteStore trait
pub struct DynamoDbQuoteStore {
    client: DynamoClient,
    table_prefix: String,
}

impl DynamoDbQuoteStore {
    /// Create a new DynamoDB quote store instance
    pub fn new(client: DynamoClient, table_prefix: String) -> Self {
        Self {
            client,
            table_prefix,
        }
    }

    /// Get table name with prefix
    fn table_name(&self, base_name: &str) -> String {
        table_name(&self.table_prefix, base_name)
    }
}

fn table_name(prefix: &str, base_name: &str) -> String {
    format!("{}_{}", prefix, base_name)
}

/// Convert QuoteRecord to DynamoDB item
fn record_to_item(record: &QuoteRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();

    item.insert("symbol".to_string(), AttributeValue::S(record.symbol.clone()));
    item.insert("price".to_string(), AttributeValue::N(record.price.to_string()));
    item.insert("absolute_change".to_string(), AttributeValue::N(record.absolute_change.to_string()));
    item.insert("percentage_change".to_string(), AttributeValue::N(record.percentage_change.to_string()));
    item.insert("history".to_string(), AttributeValue::S(record.history.clone()));
    item.insert("updated_at".to_string(), AttributeValue::S(record.updated_at.to_rfc3339()));

    item
}

fn number(item: &HashMap<String, AttributeValue>, key: &str) -> Result<f64, DatabaseError> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| DatabaseError::SerializationError(format!("Invalid {key}")))
}

/// Convert DynamoDB item to QuoteRecord
fn item_to_record(item: &HashMap<String, AttributeValue>) -> Result<QuoteRecord, DatabaseError> {
    let symbol = item.get("symbol")
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| DatabaseError::SerializationError("Missing symbol".to_string()))?
        .clone();

    let updated_at = item.get("updated_at")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| DatabaseError::SerializationError("Invalid updated_at".to_string()))?;

    // An empty history is stored as an absent attribute on some writers
    let history = item.get("history")
        .and_then(|v| v.as_s().ok())
        .cloned()
        .unwrap_or_default();

    Ok(QuoteRecord {
        symbol,
        price: number(item, "price")?,
        absolute_change: number(item, "absolute_change")?,
        percentage_change: number(item, "percentage_change")?,
        history,
        updated_at,
    })
}

#[async_trait::async_trait]
impl QuoteStore for DynamoDbQuoteStore {
    async fn query_all(&self) -> Result<Vec<QuoteRecord>, DatabaseError> {
        let table_name = self.table_name("quotes");
        let mut records = Vec::new();
        let mut start_key = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&table_name)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| {
                    log::error!("Failed to scan quotes: {:?}", e);
                    DatabaseError::Unknown(format!("DynamoDB error: {:?}", e))
                })?;

            if let Some(items) = output.items {
                for item in items {
                    match item_to_record(&item) {
                        Ok(record) => records.push(record),
                        Err(e) => log::warn!("Failed to parse quote row: {:?}", e),
                    }
                }
            }

            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(records)
    }

    async fn query_symbol(&self, symbol: &str) -> Result<Option<QuoteRecord>, DatabaseError> {
        let table_name = self.table_name("quotes");

        let result = self
            .client
            .get_item()
            .table_name(&table_name)
            .key("symbol", AttributeValue::S(symbol.to_uppercase()))
            .send()
            .await;

        match result {
            Ok(output) => match output.item {
                Some(item) => Ok(Some(item_to_record(&item)?)),
                None => Ok(None),
            },
            Err(e) => {
                log::error!("Failed to get quote: {:?}", e);
                Err(DatabaseError::Unknown(format!("DynamoDB error: {:?}", e)))
            }
        }
    }

    async fn bulk_insert(&self, records: Vec<QuoteRecord>) -> Result<usize, DatabaseError> {
        let table_name = self.table_name("quotes");
        let count = records.len();

        for chunk in records.chunks(BATCH_WRITE_LIMIT) {
            let mut requests = Vec::with_capacity(chunk.len());
            for record in chunk {
                let put = PutRequest::builder()
                    .set_item(Some(record_to_item(record)))
                    .build()
                    .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
                requests.push(WriteRequest::builder().put_request(put).build());
            }

            let mut pending = HashMap::from([(table_name.clone(), requests)]);

            // Throttled writes come back as unprocessed items
            let mut round = 0;
            while !pending.is_empty() {
                if round > 0 {
                    let delay = unprocessed_retry_delay(round - 1).ok_or_else(|| {
                        DatabaseError::Unknown(format!(
                            "{} quote rows still unprocessed after {} retries",
                            pending.values().map(Vec::len).sum::<usize>(),
                            MAX_UNPROCESSED_RETRIES
                        ))
                    })?;
                    log::warn!("Resending unprocessed quote rows in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                round += 1;

                let output = self
                    .client
                    .batch_write_item()
                    .set_request_items(Some(pending))
                    .send()
                    .await
                    .map_err(|e| {
                        log::error!("Failed to write quotes: {:?}", e);
                        DatabaseError::Unknown(format!("DynamoDB error: {:?}", e))
                    })?;

                pending = output
                    .unprocessed_items
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(_, requests)| !requests.is_empty())
                    .collect();
            }
        }

        log::info!("Wrote {} quote rows to {}", count, table_name);
        Ok(count)
    }

    async fn delete_symbol(&self, symbol: &str) -> Result<bool, DatabaseError> {
        let table_name = self.table_name("quotes");

        let result = self
            .client
            .delete_item()
            .table_name(&table_name)
            .key("symbol", AttributeValue::S(symbol.to_uppercase()))
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllOld)
            .send()
            .await;

        match result {
            Ok(output) => {
                let existed = output.attributes.is_some_and(|attrs| !attrs.is_empty());
                log::info!("Deleted quote row for {} (existed: {})", symbol, existed);
                Ok(existed)
            }
            Err(e) => {
                log::error!("Failed to delete quote: {:?}", e);
                Err(DatabaseError::Unknown(format!("DynamoDB error: {:?}", e)))
            }
        }
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        // Simple health check by listing tables
        match self.client.list_tables().send().await {
            Ok(_) => {
                log::debug!("DynamoDB health check passed");
                Ok(())
            }
            Err(e) => {
                log::error!("DynamoDB health check failed: {:?}", e);
                Err(DatabaseError::ConnectionError(format!("Health check failed: {:?}", e)))
            }
        }
    }
}
