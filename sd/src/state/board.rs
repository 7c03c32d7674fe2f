//! SectorBoard - the indicator store and the rules that mutate it
//!
//! The board is single-owner: the SectorManager actor holds the only instance
//! and applies commands one at a time, so every operation here runs as one
//! indivisible read-modify-write.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{IndicatorKey, IndicatorSnapshot, IndicatorSummary, MesaId, MesaIndicators, SectorStatus};
use crate::error::{SectorError, SectorResponse};
use crate::registry::{DefeatSink, Registry};
use crate::sector::{Sector, clamp_mesa, resolve_sector, same_sector, sector_range, visible_mesas};

/// Per-mesa indicator store plus its collaborators
pub struct SectorBoard {
    indicators: HashMap<MesaId, MesaIndicators>,
    registry: Arc<dyn Registry>,
    defeats: Arc<dyn DefeatSink>,
}

impl SectorBoard {
    /// Create an empty board
    pub fn new(registry: Arc<dyn Registry>, defeats: Arc<dyn DefeatSink>) -> Self {
        Self {
            indicators: HashMap::new(),
            registry,
            defeats,
        }
    }

    /// Get or lazily create the record for a mesa
    fn ensure(&mut self, mesa_id: MesaId) -> &mut MesaIndicators {
        self.indicators.entry(mesa_id).or_default()
    }

    /// Sector status as seen by `mesa_id`, filtered by its own connectivity
    pub fn status(&mut self, mesa_id: MesaId) -> SectorStatus {
        let mesa_id = clamp_mesa(mesa_id);
        debug!(mesa_id, "SectorBoard::status: called");
        let sector = resolve_sector(mesa_id);
        self.ensure(mesa_id);
        let viewer_disconnected = self.registry.is_disconnected(mesa_id);
        self.build_status(&sector, mesa_id, viewer_disconnected)
    }

    /// Put an indicator in play, or take it out of play
    ///
    /// Activation seeds the value from the number of live mesas in the sector.
    /// Deactivation only clears the owner; the value is kept.
    pub fn set_active(&mut self, mesa_id: MesaId, key: IndicatorKey, active: bool) -> SectorResponse<SectorStatus> {
        let mesa_id = clamp_mesa(mesa_id);
        debug!(mesa_id, %key, active, "SectorBoard::set_active: called");

        if self.registry.is_disconnected(mesa_id) {
            debug!(mesa_id, "SectorBoard::set_active: mesa disconnected, no-op");
            return Ok(self.status(mesa_id));
        }

        let sector = resolve_sector(mesa_id);
        let active_mesas = self.registry.count_active_in_range(sector_range(sector.id).mesas());
        let indicator = self.ensure(mesa_id).get_mut(key);

        if indicator.defeated {
            debug!(mesa_id, %key, "SectorBoard::set_active: indicator defeated");
            return Err(SectorError::AlreadyDefeated(key));
        }

        if active {
            // A foreign owner can only come from restored state
            if let Some(owner) = indicator.active_owner
                && owner != mesa_id
            {
                debug!(mesa_id, owner, "SectorBoard::set_active: owned by another mesa");
                return Err(SectorError::AlreadyActiveElsewhere { key, owner });
            }
            indicator.active_owner = Some(mesa_id);
            indicator.value = key.initial_value(active_mesas);
            info!(mesa_id, %key, value = indicator.value, active_mesas, "Indicator activated");
        } else {
            if indicator.active_owner != Some(mesa_id) {
                debug!(mesa_id, owner = ?indicator.active_owner, "SectorBoard::set_active: caller is not owner");
                return Err(SectorError::NotOwner { key, mesa_id });
            }
            indicator.active_owner = None;
            info!(mesa_id, %key, value = indicator.value, "Indicator deactivated");
        }

        Ok(self.build_status(&sector, mesa_id, false))
    }

    /// Apply a contribution from `mesa_id` to `target_mesa_id`'s indicator
    ///
    /// Driving an indicator from a positive value to exactly zero with a
    /// decrement defeats it and notifies the defeat sink once.
    pub fn apply_delta(
        &mut self,
        mesa_id: MesaId,
        target_mesa_id: MesaId,
        key: IndicatorKey,
        delta: i64,
    ) -> SectorResponse<SectorStatus> {
        let mesa_id = clamp_mesa(mesa_id);
        let target_mesa_id = clamp_mesa(target_mesa_id);
        debug!(mesa_id, target_mesa_id, %key, delta, "SectorBoard::apply_delta: called");

        if self.registry.is_disconnected(mesa_id) || self.registry.is_disconnected(target_mesa_id) {
            debug!("SectorBoard::apply_delta: source or target disconnected, no-op");
            return Ok(self.status(mesa_id));
        }

        if !same_sector(mesa_id, target_mesa_id) {
            debug!("SectorBoard::apply_delta: cross-sector");
            return Err(SectorError::CrossSector {
                from: mesa_id,
                to: target_mesa_id,
            });
        }

        let indicator = self.ensure(target_mesa_id).get_mut(key);
        if indicator.defeated {
            return Err(SectorError::AlreadyDefeated(key));
        }
        if !indicator.is_active() {
            return Err(SectorError::NotActive(key));
        }

        let current = indicator.value;
        let next = (i64::from(current) + delta).clamp(0, i64::from(u32::MAX)) as u32;
        let defeated_now = current > 0 && next == 0 && delta < 0;
        indicator.value = next;

        if defeated_now {
            indicator.defeated = true;
            info!(target_mesa_id, %key, by = mesa_id, "Indicator defeated");
            if let Err(e) = self.defeats.notify_defeat(target_mesa_id, key.avatar_name()) {
                warn!(target_mesa_id, %key, error = %e, "Failed to record indicator defeat");
            }
        } else {
            debug!(target_mesa_id, %key, current, next, "SectorBoard::apply_delta: value updated");
        }

        Ok(self.build_status(&resolve_sector(target_mesa_id), mesa_id, false))
    }

    /// Defeat tally over every registered mesa (read-only)
    pub fn summary(&self) -> IndicatorSummary {
        debug!("SectorBoard::summary: called");
        let mut summary = IndicatorSummary::default();
        let default = MesaIndicators::default();
        for mesa_id in self.registry.registered_mesas() {
            let indicators = self.indicators.get(&mesa_id).unwrap_or(&default);
            summary.record(resolve_sector(mesa_id).id, mesa_id, indicators);
        }
        summary
    }

    /// Copy of the whole indicator store
    pub fn snapshot(&self) -> IndicatorSnapshot {
        debug!(count = self.indicators.len(), "SectorBoard::snapshot: called");
        self.indicators.iter().map(|(id, m)| (*id, m.clone())).collect()
    }

    /// Replace the whole indicator store
    pub fn restore(&mut self, snapshot: IndicatorSnapshot) {
        debug!(count = snapshot.len(), "SectorBoard::restore: called");
        self.indicators = snapshot
            .into_iter()
            .map(|(id, m)| (clamp_mesa(id), m.normalized()))
            .collect();
        info!(count = self.indicators.len(), "Indicator store restored");
    }

    fn build_status(&self, sector: &Sector, viewer: MesaId, viewer_disconnected: bool) -> SectorStatus {
        let mesas = visible_mesas(sector, viewer, viewer_disconnected, self.registry.as_ref());
        let indicators_by_mesa: BTreeMap<MesaId, MesaIndicators> = mesas
            .iter()
            .map(|id| (*id, self.indicators.get(id).cloned().unwrap_or_default()))
            .collect();
        SectorStatus {
            sector_id: sector.id,
            mesas,
            indicators_by_mesa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DefeatLog, TableRegistry};
    use proptest::prelude::*;

    struct Fixture {
        registry: Arc<TableRegistry>,
        defeats: Arc<DefeatLog>,
        board: SectorBoard,
    }

    fn fixture(mesas: &[MesaId]) -> Fixture {
        let registry = Arc::new(TableRegistry::new());
        for mesa in mesas {
            registry.register(*mesa);
        }
        let defeats = Arc::new(DefeatLog::new());
        let board = SectorBoard::new(registry.clone(), defeats.clone());
        Fixture {
            registry,
            defeats,
            board,
        }
    }

    struct FailingSink;

    impl DefeatSink for FailingSink {
        fn notify_defeat(&self, _mesa_id: MesaId, _avatar_name: &str) -> eyre::Result<()> {
            Err(eyre::eyre!("sink unavailable"))
        }
    }

    #[test]
    fn test_status_creates_record_lazily() {
        let mut f = fixture(&[1, 2]);
        assert!(f.board.snapshot().is_empty());

        let status = f.board.status(1);
        assert_eq!(status.sector_id, 1);
        assert_eq!(status.mesas, vec![1, 2]);
        assert_eq!(status.indicators_by_mesa.len(), 2);

        // Only the viewer's record was created
        let snapshot = f.board.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&1));
    }

    #[test]
    fn test_activate_seeds_from_active_mesas() {
        let mut f = fixture(&[1, 2, 3]);
        let status = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        let ind = status.indicator(1, IndicatorKey::Mangog).unwrap();
        assert_eq!(ind.active_owner, Some(1));
        assert_eq!(ind.value, 30);

        let status = f.board.set_active(2, IndicatorKey::Gate, true).unwrap();
        assert_eq!(status.indicator(2, IndicatorKey::Gate).unwrap().value, 21);
    }

    #[test]
    fn test_activate_ignores_disconnected_sector_mates() {
        let mut f = fixture(&[1, 2, 3, 4]);
        f.registry.set_disconnected(4, true);
        let status = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        assert_eq!(status.indicator(1, IndicatorKey::Mangog).unwrap().value, 30);
    }

    #[test]
    fn test_deactivate_keeps_value() {
        let mut f = fixture(&[1, 2, 3]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        f.board.apply_delta(2, 1, IndicatorKey::Mangog, -5).unwrap();

        let status = f.board.set_active(1, IndicatorKey::Mangog, false).unwrap();
        let ind = status.indicator(1, IndicatorKey::Mangog).unwrap();
        assert_eq!(ind.active_owner, None);
        assert_eq!(ind.value, 25);
    }

    #[test]
    fn test_deactivate_requires_owner() {
        let mut f = fixture(&[1, 2]);
        let err = f.board.set_active(1, IndicatorKey::Gate, false).unwrap_err();
        assert_eq!(
            err,
            SectorError::NotOwner {
                key: IndicatorKey::Gate,
                mesa_id: 1
            }
        );
    }

    #[test]
    fn test_activate_rejects_foreign_owner() {
        let mut f = fixture(&[1, 2]);
        let mut snapshot = IndicatorSnapshot::new();
        let mut mesa = MesaIndicators::default();
        mesa.mangog.active_owner = Some(2);
        mesa.mangog.value = 20;
        snapshot.insert(1, mesa);
        f.board.restore(snapshot);

        let err = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap_err();
        assert_eq!(
            err,
            SectorError::AlreadyActiveElsewhere {
                key: IndicatorKey::Mangog,
                owner: 2
            }
        );
        assert_eq!(f.board.snapshot()[&1].mangog.value, 20);
    }

    #[test]
    fn test_disconnected_activation_is_noop() {
        let mut f = fixture(&[1, 2]);
        f.registry.set_disconnected(1, true);
        let status = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        assert_eq!(status.mesas, vec![1]);
        let ind = status.indicator(1, IndicatorKey::Mangog).unwrap();
        assert_eq!(ind.active_owner, None);
        assert_eq!(ind.value, 0);
    }

    #[test]
    fn test_defeat_scenario_notifies_once() {
        let mut f = fixture(&[1, 2, 3]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();

        let status = f.board.apply_delta(2, 1, IndicatorKey::Mangog, -30).unwrap();
        let ind = status.indicator(1, IndicatorKey::Mangog).unwrap();
        assert_eq!(ind.value, 0);
        assert!(ind.defeated);
        assert_eq!(ind.active_owner, Some(1));

        let records = f.defeats.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mesa_id, 1);
        assert_eq!(records[0].avatar_name, "Mangog");

        // Defeated is absorbing
        let err = f.board.apply_delta(2, 1, IndicatorKey::Mangog, -1).unwrap_err();
        assert_eq!(err, SectorError::AlreadyDefeated(IndicatorKey::Mangog));
        let err = f.board.set_active(1, IndicatorKey::Mangog, false).unwrap_err();
        assert_eq!(err, SectorError::AlreadyDefeated(IndicatorKey::Mangog));
        let err = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap_err();
        assert_eq!(err, SectorError::AlreadyDefeated(IndicatorKey::Mangog));
        assert_eq!(f.defeats.records().len(), 1);
    }

    #[test]
    fn test_overshoot_clamps_to_zero_and_defeats() {
        let mut f = fixture(&[5, 6]);
        f.board.set_active(5, IndicatorKey::Gate, true).unwrap();
        let status = f.board.apply_delta(5, 5, IndicatorKey::Gate, -100).unwrap();
        let ind = status.indicator(5, IndicatorKey::Gate).unwrap();
        assert_eq!(ind.value, 0);
        assert!(ind.defeated);
        assert_eq!(f.defeats.records()[0].avatar_name, "Portal entre dos mundos");
    }

    #[test]
    fn test_zero_value_does_not_defeat() {
        // No live mesas in the sector besides unregistered callers: value seeds at 0
        let mut f = fixture(&[]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        f.board.apply_delta(1, 1, IndicatorKey::Mangog, -3).unwrap();

        let snapshot = f.board.snapshot();
        assert_eq!(snapshot[&1].mangog.value, 0);
        assert!(!snapshot[&1].mangog.defeated);
        assert!(f.defeats.records().is_empty());
    }

    #[test]
    fn test_positive_delta_raises_value() {
        let mut f = fixture(&[9, 10]);
        f.board.set_active(9, IndicatorKey::Gate, true).unwrap();
        let status = f.board.apply_delta(10, 9, IndicatorKey::Gate, 6).unwrap();
        assert_eq!(status.indicator(9, IndicatorKey::Gate).unwrap().value, 20);
    }

    #[test]
    fn test_delta_on_dormant_indicator_fails() {
        let mut f = fixture(&[1, 2]);
        let err = f.board.apply_delta(2, 1, IndicatorKey::Gate, -1).unwrap_err();
        assert_eq!(err, SectorError::NotActive(IndicatorKey::Gate));
    }

    #[test]
    fn test_cross_sector_delta_mutates_nothing() {
        let mut f = fixture(&[4, 5]);
        f.board.set_active(5, IndicatorKey::Mangog, true).unwrap();
        let before = f.board.snapshot();

        let err = f.board.apply_delta(4, 5, IndicatorKey::Mangog, -1).unwrap_err();
        assert_eq!(err, SectorError::CrossSector { from: 4, to: 5 });
        assert_eq!(f.board.snapshot(), before);
    }

    #[test]
    fn test_disconnected_target_delta_is_noop() {
        let mut f = fixture(&[1, 2]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        f.registry.set_disconnected(1, true);

        let status = f.board.apply_delta(2, 1, IndicatorKey::Mangog, -20).unwrap();
        // Caller is connected, so the disconnected target is hidden
        assert_eq!(status.mesas, vec![2]);

        f.registry.set_disconnected(1, false);
        assert_eq!(f.board.snapshot()[&1].mangog.value, 20);
    }

    #[test]
    fn test_unregistered_caller_may_contribute() {
        let mut f = fixture(&[1]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        let status = f.board.apply_delta(3, 1, IndicatorKey::Mangog, -4).unwrap();
        assert_eq!(status.indicator(1, IndicatorKey::Mangog).unwrap().value, 6);
    }

    #[test]
    fn test_disconnected_viewer_scenario() {
        let mut f = fixture(&[5, 6, 7, 8]);
        f.registry.set_disconnected(5, true);

        assert_eq!(f.board.status(5).mesas, vec![5]);
        assert_eq!(f.board.status(6).mesas, vec![6, 7, 8]);
    }

    #[test]
    fn test_sink_failure_keeps_defeat() {
        let registry = Arc::new(TableRegistry::new());
        registry.register(1);
        let mut board = SectorBoard::new(registry, Arc::new(FailingSink));
        board.set_active(1, IndicatorKey::Mangog, true).unwrap();

        let status = board.apply_delta(1, 1, IndicatorKey::Mangog, -10).unwrap();
        assert!(status.indicator(1, IndicatorKey::Mangog).unwrap().defeated);
    }

    #[test]
    fn test_status_returns_copies() {
        let mut f = fixture(&[1]);
        let mut status = f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        if let Some(m) = status.indicators_by_mesa.get_mut(&1) {
            m.mangog.value = 999;
        }
        assert_eq!(f.board.snapshot()[&1].mangog.value, 10);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut f = fixture(&[1, 2, 3]);
        f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
        f.board.apply_delta(2, 1, IndicatorKey::Mangog, -30).unwrap();
        let snapshot = f.board.snapshot();

        let mut restored = SectorBoard::new(f.registry.clone(), f.defeats.clone());
        restored.restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);

        // Restore replaces, it does not merge
        restored.restore(IndicatorSnapshot::new());
        assert!(restored.snapshot().is_empty());
    }

    #[test]
    fn test_summary_counts_registered_mesas() {
        let mut f = fixture(&[1, 2, 9]);
        f.registry.set_disconnected(2, true);
        f.board.set_active(1, IndicatorKey::Gate, true).unwrap();
        f.board.apply_delta(1, 1, IndicatorKey::Gate, -7).unwrap();

        let summary = f.board.summary();
        let s1 = &summary.by_sector[&1];
        assert_eq!(s1.total_mesas, 2);
        assert_eq!(s1.gate_defeated, 1);
        assert_eq!(s1.mangog_defeated, 0);
        assert!(s1.mesas[&1].gate_defeated);
        assert_eq!(summary.by_sector[&3].total_mesas, 1);

        // Summary never creates records
        assert!(!f.board.snapshot().contains_key(&9));
    }

    proptest! {
        #[test]
        fn prop_value_never_negative_and_defeat_once(deltas in proptest::collection::vec(-40i64..40, 1..40)) {
            let mut f = fixture(&[1, 2, 3]);
            f.board.set_active(1, IndicatorKey::Mangog, true).unwrap();
            for delta in deltas {
                let _ = f.board.apply_delta(2, 1, IndicatorKey::Mangog, delta);
                let ind = f.board.snapshot()[&1].mangog.clone();
                prop_assert!(ind.defeated || ind.value > 0);
                prop_assert!(f.defeats.records().len() <= 1);
                prop_assert_eq!(f.defeats.records().len() == 1, ind.defeated);
            }
        }
    }
}
