use super::database::{DatabaseError, QuoteRecord, QuoteStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Local quote store keyed by symbol.
///
/// When opened with a path, every mutation rewrites a JSON snapshot so rows
/// survive a restart.
pub struct MemoryQuoteStore {
    rows: RwLock<BTreeMap<String, QuoteRecord>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            snapshot_path: None,
        }
    }

    /// Open a snapshot-backed store, loading existing rows if the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let path = path.into();
        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<QuoteRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
                records
                    .into_iter()
                    .map(|record| (record.symbol.clone(), record))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        log::info!("Opened quote store at {} ({} rows)", path.display(), rows.len());

        Ok(Self {
            rows: RwLock::new(rows),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self, rows: &BTreeMap<String, QuoteRecord>) -> Result<(), DatabaseError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let records: Vec<&QuoteRecord> = rows.values().collect();
        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated snapshot
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn query_all(&self) -> Result<Vec<QuoteRecord>, DatabaseError> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn query_symbol(&self, symbol: &str) -> Result<Option<QuoteRecord>, DatabaseError> {
        Ok(self.rows.read().await.get(&symbol.to_uppercase()).cloned())
    }

    async fn bulk_insert(&self, records: Vec<QuoteRecord>) -> Result<usize, DatabaseError> {
        let mut rows = self.rows.write().await;
        let count = records.len();
        for record in records {
            rows.insert(record.symbol.clone(), record);
        }
        self.persist(&rows).await?;
        Ok(count)
    }

    async fn delete_symbol(&self, symbol: &str) -> Result<bool, DatabaseError> {
        let mut rows = self.rows.write().await;
        let removed = rows.remove(&symbol.to_uppercase()).is_some();
        if removed {
            self.persist(&rows).await?;
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
