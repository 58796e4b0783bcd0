use super::{PreferencesError, SettingsBackend, SettingsSnapshot};
use async_trait::async_trait;
use std::path::PathBuf;

/// Settings stored as a JSON document on local disk
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsBackend for JsonFileSettings {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load(&self) -> Result<Option<SettingsSnapshot>, PreferencesError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PreferencesError::Serialization(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, snapshot: &SettingsSnapshot) -> Result<(), PreferencesError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PreferencesError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
