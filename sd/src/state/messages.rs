//! Sector manager messages
//!
//! Commands and responses for the actor pattern.

use std::fmt;

use tokio::sync::oneshot;

use crate::domain::{IndicatorKey, IndicatorSnapshot, IndicatorSummary, MesaId, SectorStatus};
use crate::error::SectorResponse;

/// Commands sent to the SectorManager actor
#[derive(Debug)]
pub enum SectorCommand {
    GetStatus {
        mesa_id: MesaId,
        reply: oneshot::Sender<SectorStatus>,
    },
    SetActive {
        mesa_id: MesaId,
        key: IndicatorKey,
        active: bool,
        reply: oneshot::Sender<SectorResponse<SectorStatus>>,
    },
    ApplyDelta {
        mesa_id: MesaId,
        target_mesa_id: MesaId,
        key: IndicatorKey,
        delta: i64,
        reply: oneshot::Sender<SectorResponse<SectorStatus>>,
    },
    Summary {
        reply: oneshot::Sender<IndicatorSummary>,
    },

    // Persistence boundary
    Checkpoint {
        capture: Capture,
    },
    Restore {
        snapshot: IndicatorSnapshot,
        reply: oneshot::Sender<()>,
    },

    // Shutdown
    Shutdown,
}

/// Work run inside the actor with a copy of the indicator store
///
/// No other command is processed while it runs, so anything it reads from the
/// defeat sink matches the copy it is given.
pub struct Capture(pub Box<dyn FnOnce(IndicatorSnapshot) + Send>);

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Capture")
    }
}
