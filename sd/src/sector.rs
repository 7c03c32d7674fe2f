//! Sector resolution and visibility
//!
//! Sectors are a fixed game-rule grouping of mesa numbers: mesas 1-4 form
//! sector 1, mesas 5-8 form sector 2, and from mesa 9 on every run of three
//! consecutive mesas forms the next sector (sizes 4, 4, 3, 3, 3, ...).

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{MesaId, SectorId};
use crate::registry::Registry;

/// Last mesa of sector 1
pub const FIRST_SECTOR_END: MesaId = 4;

/// Last mesa of sector 2
pub const SECOND_SECTOR_END: MesaId = 8;

/// First mesa grouped in threes
pub const MESA_GROUP_START: MesaId = 9;

/// Mesas per sector from `MESA_GROUP_START` on
pub const MESA_GROUP_SIZE: MesaId = 3;

/// Sector id of the first three-mesa sector
const FIRST_GROUPED_SECTOR: SectorId = 3;

/// A sector and the mesas that theoretically belong to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    pub id: SectorId,
    /// First mesa in the sector
    pub start: MesaId,
    /// Last mesa in the sector (inclusive)
    pub end: MesaId,
}

impl Sector {
    /// Mesa numbers belonging to this sector, in order
    pub fn mesas(&self) -> RangeInclusive<MesaId> {
        self.start..=self.end
    }

    /// Check if a mesa belongs to this sector
    pub fn contains(&self, mesa_id: MesaId) -> bool {
        self.mesas().contains(&mesa_id)
    }
}

/// Clamp a raw mesa number to the valid range (mesa numbers start at 1)
pub fn clamp_mesa(mesa_id: MesaId) -> MesaId {
    mesa_id.max(1)
}

/// Resolve the sector a mesa belongs to
pub fn resolve_sector(mesa_id: MesaId) -> Sector {
    let mesa_id = clamp_mesa(mesa_id);
    if mesa_id <= FIRST_SECTOR_END {
        return sector_range(1);
    }
    if mesa_id <= SECOND_SECTOR_END {
        return sector_range(2);
    }
    let group = (mesa_id - MESA_GROUP_START) / MESA_GROUP_SIZE;
    sector_range(FIRST_GROUPED_SECTOR + group)
}

/// Mesa range of a sector id (ids below 1 are treated as sector 1)
pub fn sector_range(sector_id: SectorId) -> Sector {
    match sector_id {
        0 | 1 => Sector {
            id: 1,
            start: 1,
            end: FIRST_SECTOR_END,
        },
        2 => Sector {
            id: 2,
            start: FIRST_SECTOR_END + 1,
            end: SECOND_SECTOR_END,
        },
        _ => {
            let group = sector_id - FIRST_GROUPED_SECTOR;
            let start = MESA_GROUP_START.saturating_add(group.saturating_mul(MESA_GROUP_SIZE));
            Sector {
                id: sector_id,
                start,
                end: start.saturating_add(MESA_GROUP_SIZE - 1),
            }
        }
    }
}

/// Check if two mesas share a sector
pub fn same_sector(a: MesaId, b: MesaId) -> bool {
    resolve_sector(a).id == resolve_sector(b).id
}

/// Mesas of `sector` that `viewer` may see
///
/// Only registered mesas are ever visible. A disconnected viewer sees itself
/// and nothing else; a connected viewer sees every connected mesa.
pub fn visible_mesas(sector: &Sector, viewer: MesaId, viewer_disconnected: bool, registry: &dyn Registry) -> Vec<MesaId> {
    debug!(sector_id = sector.id, viewer, viewer_disconnected, "visible_mesas: called");
    sector
        .mesas()
        .filter(|&mesa_id| registry.is_registered(mesa_id))
        .filter(|&mesa_id| {
            if viewer_disconnected {
                mesa_id == viewer
            } else {
                !registry.is_disconnected(mesa_id)
            }
        })
        .collect()
}
