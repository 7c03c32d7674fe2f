//! sectord - Sector Indicator Coordination
//!
//! Game tables ("mesas") at a multi-table event are grouped into sectors.
//! Each mesa carries two shared boss indicators (Mangog and the Gate). A mesa
//! puts its own indicator in play, and every mesa in the same sector can then
//! damage or heal it until it reaches zero and is defeated.
//!
//! # Core Concepts
//!
//! - **Sectors**: mesas 1-4, 5-8, then groups of three (9-11, 12-14, ...)
//! - **Ownership**: only the activating mesa can deactivate its indicator
//! - **Defeat is terminal**: reported exactly once to the defeat sink
//! - **Single writer**: one actor serializes every indicator mutation
//!
//! # Modules
//!
//! - [`sector`] - Sector resolution and visibility filtering
//! - [`state`] - Indicator board and the actor that owns it
//! - [`registry`] - Table registry and defeat log collaborators
//! - [`persistence`] - Snapshot load/save
//! - [`daemon`] - Request dispatch and lifecycle
//! - [`ipc`] - Unix socket protocol, listener and client
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod ipc;
pub mod persistence;
pub mod registry;
pub mod sector;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use daemon::SectorDaemon;
pub use domain::{
    Indicator, IndicatorKey, IndicatorSnapshot, IndicatorSummary, MesaDefeats, MesaId, MesaIndicators, SectorId,
    SectorStatus, SectorTally,
};
pub use error::{SectorError, SectorResponse};
pub use ipc::{SectorClient, SectorReply, SectorRequest};
pub use persistence::{PersistedState, SnapshotStore};
pub use registry::{DefeatLog, DefeatRecord, DefeatSink, Registry, TableEntry, TableRegistry};
pub use sector::{Sector, resolve_sector, sector_range, visible_mesas};
pub use state::{SectorBoard, SectorCommand, SectorManager};
