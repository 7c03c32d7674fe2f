//! Sector coordination error types

use thiserror::Error;

use crate::domain::{IndicatorKey, MesaId};

/// Errors returned by sector indicator operations
///
/// Every variant except `ChannelError` is caller-correctable: the request was
/// malformed or conflicted with the current indicator state. Disconnected
/// tables never produce an error; their requests succeed as no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectorError {
    #[error("indicator {0} already defeated")]
    AlreadyDefeated(IndicatorKey),

    #[error("indicator {key} already active in mesa {owner}")]
    AlreadyActiveElsewhere { key: IndicatorKey, owner: MesaId },

    #[error("only the activating mesa can deactivate {key} (mesa {mesa_id} is not the owner)")]
    NotOwner { key: IndicatorKey, mesa_id: MesaId },

    #[error("mesas {from} and {to} are not in the same sector")]
    CrossSector { from: MesaId, to: MesaId },

    #[error("indicator {0} not active")]
    NotActive(IndicatorKey),

    #[error("unknown indicator: {0}")]
    UnknownIndicatorKey(String),

    #[error("Channel error")]
    ChannelError,
}

impl SectorError {
    /// Check if this error is a state conflict (HTTP 409 class)
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SectorError::AlreadyDefeated(_)
                | SectorError::AlreadyActiveElsewhere { .. }
                | SectorError::NotOwner { .. }
                | SectorError::CrossSector { .. }
                | SectorError::NotActive(_)
        )
    }

    /// HTTP-equivalent status code for the request surface
    pub fn status_code(&self) -> u16 {
        match self {
            SectorError::UnknownIndicatorKey(_) => 400,
            SectorError::ChannelError => 503,
            _ => 409,
        }
    }
}

/// Response from sector operations
pub type SectorResponse<T> = Result<T, SectorError>;
