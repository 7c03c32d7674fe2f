//! Sector daemon: request dispatch, autosave and lifecycle
//!
//! The daemon wires the SectorManager actor to its in-process collaborators
//! (TableRegistry, DefeatLog), restores them from the snapshot on start, and
//! serves one request per socket connection.

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::IndicatorKey;
use crate::ipc::listener::{read_request, send_reply};
use crate::error::SectorError;
use crate::ipc::{SectorReply, SectorRequest};
use crate::persistence::{PersistedState, SnapshotStore};
use crate::registry::{DefeatLog, TableRegistry};
use crate::state::SectorManager;

/// Version reported in Pong replies
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Running daemon context, cheap to clone into connection tasks
#[derive(Clone)]
pub struct SectorDaemon {
    manager: SectorManager,
    tables: Arc<TableRegistry>,
    defeats: Arc<DefeatLog>,
    store: SnapshotStore,
    autosave: Option<Duration>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SectorDaemon {
    /// Load the snapshot and spawn the manager actor
    ///
    /// Returns the daemon and the receiver that `run` waits on for shutdown.
    pub async fn start(config: &Config) -> Result<(Self, mpsc::Receiver<()>)> {
        debug!(snapshot = ?config.storage.snapshot_path, "SectorDaemon::start: called");
        let store = SnapshotStore::new(&config.storage.snapshot_path);
        let persisted = store.load().await?;

        let tables = Arc::new(TableRegistry::new());
        tables.restore(persisted.tables);
        for mesa_id in &config.tables {
            tables.register(*mesa_id);
        }

        let defeats = Arc::new(DefeatLog::new());
        defeats.restore(persisted.defeats);

        let manager = SectorManager::spawn(tables.clone(), defeats.clone());
        manager
            .restore(persisted.indicators)
            .await
            .context("Failed to restore indicators")?;

        let autosave = match config.storage.autosave_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        info!(
            snapshot = %store.path().display(),
            tables = tables.list().len(),
            defeats = defeats.records().len(),
            ?autosave,
            "SectorDaemon started"
        );

        Ok((
            Self {
                manager,
                tables,
                defeats,
                store,
                autosave,
                shutdown_tx,
            },
            shutdown_rx,
        ))
    }

    /// Sender that stops `run` when signalled
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until shutdown, then save and stop the actor
    pub async fn run(self, listener: UnixListener, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        debug!("SectorDaemon::run: called");

        // A disabled autosave still needs a valid period for the interval
        let period = self.autosave.unwrap_or(Duration::from_secs(3600));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            debug!("run: connection accepted");
                            let daemon = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = daemon.handle_connection(stream).await {
                                    warn!(error = %e, "run: connection error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "run: accept error");
                        }
                    }
                }
                _ = ticker.tick(), if self.autosave.is_some() => {
                    debug!("run: autosave tick");
                    if let Err(e) = self.save().await {
                        error!(error = %e, "Autosave failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("SectorDaemon shutdown requested");
                    break;
                }
            }
        }

        if let Err(e) = self.save().await {
            error!(error = %e, "Final save failed");
        }
        let _ = self.manager.shutdown().await;
        info!("SectorDaemon stopped");
        Ok(())
    }

    /// Write the current state to the snapshot file
    pub async fn save(&self) -> Result<()> {
        debug!("SectorDaemon::save: called");
        let tables = self.tables.clone();
        let defeats = self.defeats.clone();
        // Defeat records are read inside the actor so they match the indicators
        let state = self
            .manager
            .checkpoint(move |indicators| PersistedState {
                saved_at: None,
                indicators,
                tables: tables.list(),
                defeats: defeats.records(),
            })
            .await
            .context("Failed to snapshot indicators")?;
        self.store.save(&state).await
    }

    async fn handle_connection(&self, mut stream: UnixStream) -> Result<()> {
        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "handle_connection: bad request");
                let reply = SectorReply::Error {
                    status: 400,
                    message: format!("{:#}", e),
                };
                return send_reply(&mut stream, &reply).await;
            }
        };

        let shutdown = matches!(request, SectorRequest::Shutdown);
        let reply = self.handle_request(request).await;
        send_reply(&mut stream, &reply).await?;

        // Stop only after the caller has its acknowledgment
        if shutdown {
            let _ = self.shutdown_tx.try_send(());
        }
        Ok(())
    }

    /// Map one request onto the manager and collaborators
    pub async fn handle_request(&self, request: SectorRequest) -> SectorReply {
        debug!(?request, "handle_request: called");
        match request {
            SectorRequest::Status { mesa_id } => match self.manager.status(mesa_id).await {
                Ok(status) => SectorReply::Sector { status },
                Err(e) => error_reply(&e),
            },

            SectorRequest::SetActive {
                mesa_id,
                indicator,
                active,
            } => {
                let result = match indicator.parse::<IndicatorKey>() {
                    Ok(key) => self.manager.set_active(mesa_id, key, active).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(status) => SectorReply::Sector { status },
                    Err(e) => {
                        debug!(mesa_id, error = %e, "handle_request: SetActive rejected");
                        error_reply(&e)
                    }
                }
            }

            SectorRequest::ApplyDelta {
                mesa_id,
                indicator,
                target_mesa_id,
                delta,
            } => {
                let target = target_mesa_id.unwrap_or(mesa_id);
                let delta = delta.unwrap_or(0);
                let result = match indicator.parse::<IndicatorKey>() {
                    Ok(key) => self.manager.apply_delta(mesa_id, target, key, delta).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(status) => SectorReply::Sector { status },
                    Err(e) => {
                        debug!(mesa_id, target, error = %e, "handle_request: ApplyDelta rejected");
                        error_reply(&e)
                    }
                }
            }

            SectorRequest::Summary => match self.manager.summary().await {
                Ok(summary) => SectorReply::Summary { summary },
                Err(e) => error_reply(&e),
            },

            SectorRequest::Defeats => SectorReply::Defeats {
                defeats: self.defeats.records(),
            },

            SectorRequest::RegisterTable { mesa_id } => {
                self.tables.register(mesa_id);
                SectorReply::Ok
            }

            SectorRequest::SetDisconnected { mesa_id, disconnected } => {
                if self.tables.set_disconnected(mesa_id, disconnected) {
                    SectorReply::Ok
                } else {
                    SectorReply::Error {
                        status: 404,
                        message: format!("mesa {} is not registered", mesa_id),
                    }
                }
            }

            SectorRequest::RemoveTable { mesa_id } => {
                self.tables.remove(mesa_id);
                SectorReply::Ok
            }

            SectorRequest::ListTables => SectorReply::Tables {
                tables: self.tables.list(),
            },

            SectorRequest::Save => match self.save().await {
                Ok(()) => SectorReply::Ok,
                Err(e) => {
                    error!(error = %e, "Save request failed");
                    SectorReply::internal(format!("{:#}", e))
                }
            },

            SectorRequest::Ping => SectorReply::Pong {
                version: VERSION.to_string(),
            },

            SectorRequest::Shutdown => SectorReply::Ok,
        }
    }
}

/// Reply for a failed manager call; conflicts are expected traffic
fn error_reply(err: &SectorError) -> SectorReply {
    if err.is_conflict() {
        debug!(error = %err, "Request conflicts with indicator state");
    } else {
        warn!(error = %err, status = err.status_code(), "Request failed");
    }
    SectorReply::from_error(err)
}
