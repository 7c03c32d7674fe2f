//! IPC message types for daemon communication
//!
//! Simple JSON-over-newline protocol. Each message is a single line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::domain::{IndicatorSummary, MesaId, SectorStatus};
use crate::error::SectorError;
use crate::registry::{DefeatRecord, TableEntry};

/// Requests from a scoreboard client to the daemon
///
/// Indicator names travel as strings and are parsed by the daemon so that an
/// unknown name gets a 400 reply instead of a protocol error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SectorRequest {
    /// Sector status as seen by a mesa
    Status { mesa_id: MesaId },

    /// Activate or deactivate one of the mesa's own indicators
    SetActive {
        mesa_id: MesaId,
        indicator: String,
        #[serde(default)]
        active: bool,
    },

    /// Apply a delta to a sector-mate's indicator (target defaults to the caller)
    ApplyDelta {
        mesa_id: MesaId,
        indicator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_mesa_id: Option<MesaId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<i64>,
    },

    /// Defeat tally across all sectors
    Summary,

    /// Recorded defeat notifications
    Defeats,

    /// Register a table
    RegisterTable { mesa_id: MesaId },

    /// Mark a table disconnected or reconnected
    SetDisconnected { mesa_id: MesaId, disconnected: bool },

    /// Remove a table from the registry
    RemoveTable { mesa_id: MesaId },

    /// List registered tables
    ListTables,

    /// Write the snapshot now
    Save,

    /// Ping to check if daemon is alive
    Ping,

    /// Request daemon to stop gracefully
    Shutdown,
}

/// Replies from the daemon
///
/// Payloads sit under `data` next to the tag. Status and summary maps are
/// keyed by mesa/sector number, which JSON carries as string keys, and those
/// only parse back when the payload is not buffered behind an inline tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum SectorReply {
    /// Sector status after a read or mutation
    Sector { status: SectorStatus },

    /// Defeat tally
    Summary { summary: IndicatorSummary },

    /// Defeat notifications in arrival order
    Defeats { defeats: Vec<DefeatRecord> },

    /// Registered tables in mesa order
    Tables { tables: Vec<TableEntry> },

    /// Acknowledgment
    Ok,

    /// Pong response to ping
    Pong { version: String },

    /// Error response with an HTTP-equivalent status code
    Error { status: u16, message: String },
}

impl SectorReply {
    /// Build an error reply from a domain error
    pub fn from_error(err: &SectorError) -> Self {
        Self::Error {
            status: err.status_code(),
            message: err.to_string(),
        }
    }

    /// Error reply for a request the daemon could not process
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Error {
            status: 500,
            message: message.into(),
        }
    }
}
