//! Snapshot persistence for process restarts
//!
//! The daemon keeps all state in memory. This module is the load/save
//! boundary: the indicator store, the table registry and the defeat log are
//! written together as one JSON document.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::IndicatorSnapshot;
use crate::registry::{DefeatRecord, TableEntry};

/// Everything the daemon persists between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    /// Time the snapshot was written (unix ms)
    pub saved_at: Option<i64>,
    /// Per-mesa indicators
    pub indicators: IndicatorSnapshot,
    /// Registered tables
    pub tables: Vec<TableEntry>,
    /// Recorded indicator defeats
    pub defeats: Vec<DefeatRecord>,
}

/// File-backed snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store writing to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "SnapshotStore::new: called");
        Self { path }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing file yields empty state
    pub async fn load(&self) -> Result<PersistedState> {
        debug!(path = ?self.path, "SnapshotStore::load: called");
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!(path = ?self.path, "No snapshot found, starting empty");
            return Ok(PersistedState::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read snapshot: {}", self.path.display()))?;
        let state: PersistedState = serde_json::from_str(&content).context("Failed to parse snapshot")?;

        info!(
            path = ?self.path,
            mesas = state.indicators.len(),
            tables = state.tables.len(),
            defeats = state.defeats.len(),
            "Loaded snapshot"
        );
        Ok(state)
    }

    /// Write the snapshot, replacing the previous one atomically
    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        debug!(path = ?self.path, "SnapshotStore::save: called");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create snapshot directory")?;
        }

        let mut state = state.clone();
        state.saved_at = Some(chrono::Utc::now().timestamp_millis());
        let content = serde_json::to_string_pretty(&state)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .context(format!("Failed to write snapshot: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .context("Failed to replace snapshot")?;

        debug!(path = ?self.path, mesas = state.indicators.len(), "SnapshotStore::save: written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MesaIndicators;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("sectors.json"));
        let state = store.load().await.unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("nested").join("sectors.json"));

        let mut mesa = MesaIndicators::default();
        mesa.mangog.active_owner = Some(3);
        mesa.mangog.value = 12;
        let mut state = PersistedState::default();
        state.indicators.insert(3, mesa);
        state.tables.push(TableEntry {
            mesa_id: 3,
            disconnected: false,
            registered_at: 1,
        });
        state.defeats.push(DefeatRecord {
            key: "portal".to_string(),
            avatar_name: "Portal entre dos mundos".to_string(),
            mesa_id: 3,
            timestamp: 2,
        });

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert!(loaded.saved_at.is_some());
        assert_eq!(loaded.indicators, state.indicators);
        assert_eq!(loaded.tables, state.tables);
        assert_eq!(loaded.defeats, state.defeats);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_partial_document() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sectors.json");
        std::fs::write(
            &path,
            r#"{"indicators":{"4":{"mangog":{"key":"mangog","activeMesaId":4,"value":30,"defeated":false},
               "gate":{"key":"gate","activeMesaId":null,"value":0,"defeated":false}}}}"#,
        )
        .unwrap();

        let state = SnapshotStore::new(&path).load().await.unwrap();
        assert_eq!(state.indicators[&4].mangog.active_owner, Some(4));
        assert!(state.tables.is_empty());
        assert!(state.saved_at.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sectors.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SnapshotStore::new(&path).load().await.is_err());
    }
}
