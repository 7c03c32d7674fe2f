//! SectorManager - actor that owns the SectorBoard
//!
//! Processes commands via channels so every board operation runs to
//! completion before the next one starts.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::domain::{IndicatorKey, IndicatorSnapshot, IndicatorSummary, MesaId, SectorStatus};
use crate::error::{SectorError, SectorResponse};
use crate::registry::{DefeatSink, Registry};

use super::board::SectorBoard;
use super::messages::{Capture, SectorCommand};

/// Command channel capacity
const CHANNEL_BUFFER: usize = 256;

/// Handle to send commands to the SectorManager
#[derive(Clone)]
pub struct SectorManager {
    tx: mpsc::Sender<SectorCommand>,
}

impl SectorManager {
    /// Spawn a new SectorManager actor with an empty board
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(registry: Arc<dyn Registry>, defeats: Arc<dyn DefeatSink>) -> Self {
        debug!("SectorManager::spawn: called");
        Self::spawn_with(SectorBoard::new(registry, defeats))
    }

    /// Spawn a SectorManager actor around an existing board
    pub fn spawn_with(board: SectorBoard) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        tokio::spawn(actor_loop(board, rx));
        info!("SectorManager spawned");
        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SectorCommand) -> SectorResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SectorError::ChannelError)?;
        reply_rx.await.map_err(|_| SectorError::ChannelError)
    }

    /// Sector status as seen by a mesa
    pub async fn status(&self, mesa_id: MesaId) -> SectorResponse<SectorStatus> {
        debug!(mesa_id, "status: called");
        self.request(|reply| SectorCommand::GetStatus { mesa_id, reply }).await
    }

    /// Activate or deactivate one of the mesa's own indicators
    pub async fn set_active(&self, mesa_id: MesaId, key: IndicatorKey, active: bool) -> SectorResponse<SectorStatus> {
        debug!(mesa_id, %key, active, "set_active: called");
        self.request(|reply| SectorCommand::SetActive {
            mesa_id,
            key,
            active,
            reply,
        })
        .await?
    }

    /// Contribute a delta to a sector-mate's indicator
    pub async fn apply_delta(
        &self,
        mesa_id: MesaId,
        target_mesa_id: MesaId,
        key: IndicatorKey,
        delta: i64,
    ) -> SectorResponse<SectorStatus> {
        debug!(mesa_id, target_mesa_id, %key, delta, "apply_delta: called");
        self.request(|reply| SectorCommand::ApplyDelta {
            mesa_id,
            target_mesa_id,
            key,
            delta,
            reply,
        })
        .await?
    }

    /// Defeat tally across all sectors
    pub async fn summary(&self) -> SectorResponse<IndicatorSummary> {
        debug!("summary: called");
        self.request(|reply| SectorCommand::Summary { reply }).await
    }

    /// Copy of the whole indicator store
    pub async fn snapshot(&self) -> SectorResponse<IndicatorSnapshot> {
        debug!("snapshot: called");
        self.checkpoint(|snapshot| snapshot).await
    }

    /// Run `capture` inside the actor with a copy of the indicator store
    ///
    /// Defeat notifications only happen inside the actor, so state read from
    /// the defeat sink here is consistent with the copy.
    pub async fn checkpoint<T, F>(&self, capture: F) -> SectorResponse<T>
    where
        T: Send + 'static,
        F: FnOnce(IndicatorSnapshot) -> T + Send + 'static,
    {
        debug!("checkpoint: called");
        self.request(|reply| SectorCommand::Checkpoint {
            capture: Capture(Box::new(move |snapshot| {
                let _ = reply.send(capture(snapshot));
            })),
        })
        .await
    }

    /// Replace the whole indicator store
    pub async fn restore(&self, snapshot: IndicatorSnapshot) -> SectorResponse<()> {
        debug!(count = snapshot.len(), "restore: called");
        self.request(|reply| SectorCommand::Restore { snapshot, reply }).await
    }

    /// Shutdown the SectorManager
    pub async fn shutdown(&self) -> SectorResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(SectorCommand::Shutdown)
            .await
            .map_err(|_| SectorError::ChannelError)
    }
}

/// The actor loop that owns the board and processes commands
async fn actor_loop(mut board: SectorBoard, mut rx: mpsc::Receiver<SectorCommand>) {
    debug!("SectorManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SectorCommand::GetStatus { mesa_id, reply } => {
                debug!(mesa_id, "actor_loop: GetStatus command");
                let _ = reply.send(board.status(mesa_id));
            }

            SectorCommand::SetActive {
                mesa_id,
                key,
                active,
                reply,
            } => {
                debug!(mesa_id, %key, active, "actor_loop: SetActive command");
                let _ = reply.send(board.set_active(mesa_id, key, active));
            }

            SectorCommand::ApplyDelta {
                mesa_id,
                target_mesa_id,
                key,
                delta,
                reply,
            } => {
                debug!(mesa_id, target_mesa_id, %key, delta, "actor_loop: ApplyDelta command");
                let _ = reply.send(board.apply_delta(mesa_id, target_mesa_id, key, delta));
            }

            SectorCommand::Summary { reply } => {
                debug!("actor_loop: Summary command");
                let _ = reply.send(board.summary());
            }

            SectorCommand::Checkpoint { capture } => {
                debug!("actor_loop: Checkpoint command");
                (capture.0)(board.snapshot());
            }

            SectorCommand::Restore { snapshot, reply } => {
                debug!(count = snapshot.len(), "actor_loop: Restore command");
                board.restore(snapshot);
                let _ = reply.send(());
            }

            SectorCommand::Shutdown => {
                info!("SectorManager shutting down");
                break;
            }
        }
    }

    debug!("SectorManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DefeatLog, TableRegistry};

    fn spawn_manager(mesas: &[MesaId]) -> (SectorManager, Arc<TableRegistry>, Arc<DefeatLog>) {
        let registry = Arc::new(TableRegistry::new());
        for mesa in mesas {
            registry.register(*mesa);
        }
        let defeats = Arc::new(DefeatLog::new());
        let manager = SectorManager::spawn(registry.clone(), defeats.clone());
        (manager, registry, defeats)
    }

    #[tokio::test]
    async fn test_manager_activation_and_delta() {
        let (manager, _registry, defeats) = spawn_manager(&[1, 2, 3]);

        let status = manager.set_active(1, IndicatorKey::Mangog, true).await.unwrap();
        assert_eq!(status.indicator(1, IndicatorKey::Mangog).unwrap().value, 30);

        let status = manager.apply_delta(2, 1, IndicatorKey::Mangog, -30).await.unwrap();
        assert!(status.indicator(1, IndicatorKey::Mangog).unwrap().defeated);
        assert_eq!(defeats.records().len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_manager_propagates_errors() {
        let (manager, _registry, _defeats) = spawn_manager(&[1, 9]);
        let err = manager.apply_delta(1, 9, IndicatorKey::Gate, -1).await.unwrap_err();
        assert_eq!(err, SectorError::CrossSector { from: 1, to: 9 });
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_manager_snapshot_restore() {
        let (manager, _registry, _defeats) = spawn_manager(&[1]);
        manager.set_active(1, IndicatorKey::Gate, true).await.unwrap();
        let snapshot = manager.snapshot().await.unwrap();
        assert_eq!(snapshot[&1].gate.value, 7);

        manager.restore(IndicatorSnapshot::new()).await.unwrap();
        assert!(manager.snapshot().await.unwrap().is_empty());

        manager.restore(snapshot.clone()).await.unwrap();
        assert_eq!(manager.snapshot().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_concurrent_decrements_defeat_once() {
        let (manager, _registry, defeats) = spawn_manager(&[1, 2, 3, 4]);
        manager.set_active(1, IndicatorKey::Mangog, true).await.unwrap();

        // 40 points, 80 concurrent decrements of 1 from three sector-mates
        let mut tasks = Vec::new();
        for i in 0..80u32 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.apply_delta(2 + i % 3, 1, IndicatorKey::Mangog, -1).await
            }));
        }
        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        assert_eq!(ok, 40);
        assert_eq!(defeats.records().len(), 1);
        let snapshot = manager.snapshot().await.unwrap();
        assert_eq!(snapshot[&1].mangog.value, 0);
        assert!(snapshot[&1].mangog.defeated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_checkpoint_sees_defeat_and_record_together() {
        let (manager, _registry, defeats) = spawn_manager(&[1, 2, 3]);

        for _ in 0..30 {
            manager.restore(IndicatorSnapshot::new()).await.unwrap();
            defeats.restore(Vec::new());
            manager.set_active(1, IndicatorKey::Mangog, true).await.unwrap();

            // 30 points, the third hit defeats while checkpoints are taken
            let damage = {
                let manager = manager.clone();
                tokio::spawn(async move {
                    for _ in 0..3 {
                        manager.apply_delta(2, 1, IndicatorKey::Mangog, -10).await.unwrap();
                    }
                })
            };

            for _ in 0..10 {
                let log = defeats.clone();
                let (defeated, recorded) = manager
                    .checkpoint(move |snapshot| {
                        let defeated = snapshot.get(&1).is_some_and(|m| m.mangog.defeated);
                        (defeated, log.records().len())
                    })
                    .await
                    .unwrap();
                assert_eq!(recorded, usize::from(defeated));
            }

            damage.await.unwrap();
        }
        assert_eq!(defeats.records().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_manager_returns_channel_error() {
        let (manager, _registry, _defeats) = spawn_manager(&[1]);
        manager.shutdown().await.unwrap();
        // Give the actor a moment to exit
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let err = manager.status(1).await.unwrap_err();
        assert_eq!(err, SectorError::ChannelError);
    }
}
