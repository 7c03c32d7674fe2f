//! Collaborators consumed by the sector board
//!
//! The board only asks the table registry whether a mesa exists and whether
//! it is disconnected, and only tells the defeat sink that an indicator was
//! defeated. `TableRegistry` and `DefeatLog` are the in-process
//! implementations the daemon runs with.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Mutex, RwLock};

use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::MesaId;
use crate::sector::clamp_mesa;

/// Read-only view of the table registry
pub trait Registry: Send + Sync {
    /// Check if a mesa exists
    fn is_registered(&self, mesa_id: MesaId) -> bool;

    /// Check if a mesa is flagged as disconnected (unknown mesas are not)
    fn is_disconnected(&self, mesa_id: MesaId) -> bool;

    /// Count registered, connected mesas within a range
    fn count_active_in_range(&self, mesas: RangeInclusive<MesaId>) -> usize;

    /// All registered mesa numbers, in order
    fn registered_mesas(&self) -> Vec<MesaId>;
}

/// Receiver of indicator defeat notifications
///
/// Called while the board is processing a command, so implementations must
/// return quickly and never block.
pub trait DefeatSink: Send + Sync {
    fn notify_defeat(&self, mesa_id: MesaId, avatar_name: &str) -> Result<()>;
}

/// A registered table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    pub mesa_id: MesaId,
    #[serde(default)]
    pub disconnected: bool,
    /// Registration time (unix ms)
    pub registered_at: i64,
}

/// In-memory table registry
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<BTreeMap<MesaId, TableEntry>>,
}

impl TableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesa; returns false if it was already registered
    pub fn register(&self, mesa_id: MesaId) -> bool {
        let mesa_id = clamp_mesa(mesa_id);
        debug!(mesa_id, "TableRegistry::register: called");
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if tables.contains_key(&mesa_id) {
            debug!(mesa_id, "TableRegistry::register: already registered");
            return false;
        }
        tables.insert(
            mesa_id,
            TableEntry {
                mesa_id,
                disconnected: false,
                registered_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        info!(mesa_id, "Registered table");
        true
    }

    /// Flag a mesa as disconnected or reconnected; returns false if unknown
    pub fn set_disconnected(&self, mesa_id: MesaId, disconnected: bool) -> bool {
        let mesa_id = clamp_mesa(mesa_id);
        debug!(mesa_id, disconnected, "TableRegistry::set_disconnected: called");
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        match tables.get_mut(&mesa_id) {
            Some(entry) => {
                entry.disconnected = disconnected;
                info!(mesa_id, disconnected, "Updated table connectivity");
                true
            }
            None => {
                debug!(mesa_id, "TableRegistry::set_disconnected: unknown mesa");
                false
            }
        }
    }

    /// Remove a mesa; returns false if unknown
    pub fn remove(&self, mesa_id: MesaId) -> bool {
        let mesa_id = clamp_mesa(mesa_id);
        debug!(mesa_id, "TableRegistry::remove: called");
        let removed = self
            .tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&mesa_id)
            .is_some();
        if removed {
            info!(mesa_id, "Removed table");
        }
        removed
    }

    /// All registered tables, in mesa order
    pub fn list(&self) -> Vec<TableEntry> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Replace all tables
    pub fn restore(&self, entries: Vec<TableEntry>) {
        debug!(count = entries.len(), "TableRegistry::restore: called");
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.clear();
        for mut entry in entries {
            entry.mesa_id = clamp_mesa(entry.mesa_id);
            tables.insert(entry.mesa_id, entry);
        }
    }
}

impl Registry for TableRegistry {
    fn is_registered(&self, mesa_id: MesaId) -> bool {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&mesa_id)
    }

    fn is_disconnected(&self, mesa_id: MesaId) -> bool {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&mesa_id)
            .is_some_and(|t| t.disconnected)
    }

    fn count_active_in_range(&self, mesas: RangeInclusive<MesaId>) -> usize {
        if mesas.is_empty() {
            return 0;
        }
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .range(mesas)
            .filter(|(_, t)| !t.disconnected)
            .count()
    }

    fn registered_mesas(&self) -> Vec<MesaId> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

/// A recorded indicator defeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefeatRecord {
    /// Short key derived from the avatar name (mangog, portal, special)
    pub key: String,
    pub avatar_name: String,
    pub mesa_id: MesaId,
    /// Time of defeat (unix ms)
    pub timestamp: i64,
}

/// Short key for a special avatar name
fn special_key(avatar_name: &str) -> &'static str {
    match avatar_name.trim().to_lowercase().as_str() {
        "mangog" => "mangog",
        "portal entre dos mundos" => "portal",
        _ => "special",
    }
}

/// In-memory defeat sink
#[derive(Debug, Default)]
pub struct DefeatLog {
    records: Mutex<Vec<DefeatRecord>>,
}

impl DefeatLog {
    /// Create an empty defeat log
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded defeats, oldest first
    pub fn records(&self) -> Vec<DefeatRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace all records
    pub fn restore(&self, records: Vec<DefeatRecord>) {
        debug!(count = records.len(), "DefeatLog::restore: called");
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records;
    }
}

impl DefeatSink for DefeatLog {
    fn notify_defeat(&self, mesa_id: MesaId, avatar_name: &str) -> Result<()> {
        let name = avatar_name.trim();
        if name.is_empty() {
            debug!(mesa_id, "DefeatLog::notify_defeat: blank avatar name, ignoring");
            return Ok(());
        }
        let record = DefeatRecord {
            key: special_key(name).to_string(),
            avatar_name: name.to_string(),
            mesa_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        info!(mesa_id, avatar_name = name, "Recorded indicator defeat");
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(record);
        Ok(())
    }
}
