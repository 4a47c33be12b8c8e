//! Configuration store: saved server configs in one pretty-printed JSON file.
//!
//! The document maps port (as a string key) to `{...ServerConfig, savedAt}`.
//! Every write is read-modify-write of the whole document, written to a
//! sibling temp file and renamed over the original so readers never see a
//! half-written document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mockd_protocol::PersistedConfig;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Durable port → config mapping backed by a single JSON document.
pub struct ConfigStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every saved config. A missing or unparsable document is empty;
    /// individual records that fail to parse are skipped.
    pub async fn read_all(&self) -> BTreeMap<u16, PersistedConfig> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {e}", self.path.display());
                }
                return BTreeMap::new();
            }
        };

        let raw: BTreeMap<String, Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring unparsable config store {}: {e}", self.path.display());
                return BTreeMap::new();
            }
        };

        let mut configs = BTreeMap::new();
        for (key, value) in raw {
            let Ok(port) = key.parse::<u16>() else {
                warn!("Skipping saved config with non-numeric key {key:?}");
                continue;
            };
            match serde_json::from_value::<PersistedConfig>(value) {
                Ok(record) => {
                    configs.insert(port, record);
                }
                Err(e) => warn!("Skipping unparsable saved config for port {port}: {e}"),
            }
        }
        configs
    }

    /// Insert or replace the record for `port`.
    pub async fn put(&self, port: u16, record: PersistedConfig) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut configs = self.read_all().await;
        configs.insert(port, record);
        self.write_all(&configs).await
    }

    /// Remove the record for `port`. Returns whether a record existed;
    /// removing a missing record does not touch the file.
    pub async fn remove(&self, port: u16) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut configs = self.read_all().await;
        if configs.remove(&port).is_none() {
            return Ok(false);
        }
        self.write_all(&configs).await?;
        Ok(true)
    }

    async fn write_all(&self, configs: &BTreeMap<u16, PersistedConfig>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(configs)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| self.io_error(source))?;
            }
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| self.io_error(source))?;
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.io_error(source));
        }
        debug!("Wrote {} saved configs to {}", configs.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
