//! Read models returned to callers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Indicator, IndicatorKey, MesaId, MesaIndicators, SectorId};

/// A sector as seen by one viewer mesa
///
/// Indicator records are copies; mutating them has no effect on the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorStatus {
    /// Sector the viewer belongs to
    pub sector_id: SectorId,
    /// Mesas visible to the viewer, in mesa order
    pub mesas: Vec<MesaId>,
    /// Indicators for every visible mesa
    pub indicators_by_mesa: BTreeMap<MesaId, MesaIndicators>,
}

impl SectorStatus {
    /// Look up one indicator of a visible mesa
    pub fn indicator(&self, mesa_id: MesaId, key: IndicatorKey) -> Option<&Indicator> {
        self.indicators_by_mesa.get(&mesa_id).map(|m| m.get(key))
    }
}

/// Defeat flags for one mesa in the summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MesaDefeats {
    pub mangog_defeated: bool,
    pub gate_defeated: bool,
}

/// Per-sector defeat tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorTally {
    /// Mesas in the sector with a defeated mangog
    pub mangog_defeated: u32,
    /// Mesas in the sector with a defeated gate
    pub gate_defeated: u32,
    /// Registered mesas counted in the sector
    pub total_mesas: u32,
    pub mesas: BTreeMap<MesaId, MesaDefeats>,
}

/// Defeat overview across all sectors with registered mesas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSummary {
    pub by_sector: BTreeMap<SectorId, SectorTally>,
}

impl IndicatorSummary {
    /// Record one registered mesa's indicators under its sector
    pub fn record(&mut self, sector_id: SectorId, mesa_id: MesaId, indicators: &MesaIndicators) {
        let tally = self.by_sector.entry(sector_id).or_default();
        let defeats = MesaDefeats {
            mangog_defeated: indicators.mangog.defeated,
            gate_defeated: indicators.gate.defeated,
        };
        tally.total_mesas += 1;
        if defeats.mangog_defeated {
            tally.mangog_defeated += 1;
        }
        if defeats.gate_defeated {
            tally.gate_defeated += 1;
        }
        tally.mesas.insert(mesa_id, defeats);
    }
}
