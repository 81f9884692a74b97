//! Durable store for session state
//!
//! Persistence is best-effort: the controller saves in the background and
//! only logs failures. In-memory state always stays authoritative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CgmSettings, Device, Reading};

/// Snapshot of everything that survives a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Newest first
    pub readings: Vec<Reading>,
    pub settings: CgmSettings,
    pub device: Option<Device>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Load the last saved snapshot, `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// Store that keeps nothing
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(None)
    }

    async fn save(&self, _state: &PersistedState) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Single JSON document on disk, replaced atomically on each save.
/// Saves are serialized; each one writes its own temp file before the rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}.tmp", Uuid::new_v4()));
        PathBuf::from(name)
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_slice(&bytes)?;
        debug!(
            path = %self.path.display(),
            readings = state.readings.len(),
            "Loaded persisted session state"
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if let Err(e) = tokio::fs::write(&temp, json).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
