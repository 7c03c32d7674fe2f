//! Indicator domain types
//!
//! Each mesa carries exactly one indicator per fixed key. An indicator moves
//! Dormant -> Active (owner set) and back, until a decrement drives it to
//! zero and it becomes Defeated, which is terminal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MesaId;
use crate::error::SectorError;

/// The fixed indicator kinds every mesa carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKey {
    Mangog,
    Gate,
}

impl IndicatorKey {
    /// All indicator keys in slot order
    pub const ALL: [IndicatorKey; 2] = [IndicatorKey::Mangog, IndicatorKey::Gate];

    /// Wire name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mangog => "mangog",
            Self::Gate => "gate",
        }
    }

    /// Avatar name reported to the defeat sink
    pub fn avatar_name(&self) -> &'static str {
        match self {
            Self::Mangog => "Mangog",
            Self::Gate => "Portal entre dos mundos",
        }
    }

    /// Points contributed by each active mesa in the sector at activation
    pub fn value_per_active_mesa(&self) -> u32 {
        match self {
            Self::Mangog => 10,
            Self::Gate => 7,
        }
    }

    /// Starting value for an activation with `active_mesas` live tables in the sector
    pub fn initial_value(&self, active_mesas: usize) -> u32 {
        let active = u32::try_from(active_mesas).unwrap_or(u32::MAX);
        self.value_per_active_mesa().saturating_mul(active)
    }
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IndicatorKey {
    type Err = SectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "IndicatorKey::from_str: called");
        match s.trim().to_lowercase().as_str() {
            "mangog" => Ok(Self::Mangog),
            "gate" => Ok(Self::Gate),
            _ => Err(SectorError::UnknownIndicatorKey(s.to_string())),
        }
    }
}

/// State of one indicator on one mesa
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    /// Which indicator this is
    pub key: IndicatorKey,

    /// Mesa that put the indicator in play (frozen once defeated)
    #[serde(alias = "activeMesaId")]
    pub active_owner: Option<MesaId>,

    /// Remaining value; never negative
    pub value: u32,

    /// Set once the value is driven to zero by a decrement; never cleared
    pub defeated: bool,
}

impl Indicator {
    /// Create a dormant indicator
    pub fn new(key: IndicatorKey) -> Self {
        Self {
            key,
            active_owner: None,
            value: 0,
            defeated: false,
        }
    }

    /// Check if the indicator is currently in play
    pub fn is_active(&self) -> bool {
        self.active_owner.is_some() && !self.defeated
    }
}

/// The indicators owned by a single mesa
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MesaIndicators {
    pub mangog: Indicator,
    pub gate: Indicator,
}

impl Default for MesaIndicators {
    fn default() -> Self {
        Self {
            mangog: Indicator::new(IndicatorKey::Mangog),
            gate: Indicator::new(IndicatorKey::Gate),
        }
    }
}

impl MesaIndicators {
    /// Get the indicator for a key
    pub fn get(&self, key: IndicatorKey) -> &Indicator {
        match key {
            IndicatorKey::Mangog => &self.mangog,
            IndicatorKey::Gate => &self.gate,
        }
    }

    /// Get the indicator for a key, mutably
    pub fn get_mut(&mut self, key: IndicatorKey) -> &mut Indicator {
        match key {
            IndicatorKey::Mangog => &mut self.mangog,
            IndicatorKey::Gate => &mut self.gate,
        }
    }

    /// Re-stamp each indicator's key from the slot it occupies
    pub fn normalized(mut self) -> Self {
        self.mangog.key = IndicatorKey::Mangog;
        self.gate.key = IndicatorKey::Gate;
        self
    }
}

/// Full copy of the per-mesa indicator store
pub type IndicatorSnapshot = BTreeMap<MesaId, MesaIndicators>;
