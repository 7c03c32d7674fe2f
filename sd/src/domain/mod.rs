//! Domain types for sectord
//!
//! Core domain types: Indicator, MesaIndicators, SectorStatus, IndicatorSummary.
//! All serialize with camelCase field names, which is also the snapshot format.

mod indicator;
mod status;

pub use indicator::{Indicator, IndicatorKey, IndicatorSnapshot, MesaIndicators};
pub use status::{IndicatorSummary, MesaDefeats, SectorStatus, SectorTally};

/// Physical game table number
pub type MesaId = u32;

/// Sector number (1-based)
pub type SectorId = u32;
