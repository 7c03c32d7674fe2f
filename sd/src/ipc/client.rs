//! IPC client for talking to the sector daemon
//!
//! Each call opens a connection, sends one request line and reads one reply line.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::get_socket_path;
use super::listener::MAX_REQUEST_SIZE;
use super::messages::{SectorReply, SectorRequest};
use crate::domain::{IndicatorSummary, MesaId, SectorStatus};
use crate::registry::{DefeatRecord, TableEntry};

/// Default timeout for IPC operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for communicating with the daemon via IPC
#[derive(Debug, Clone)]
pub struct SectorClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for SectorClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected(reply: SectorReply) -> eyre::Report {
    match reply {
        SectorReply::Error { status, message } => eyre::eyre!("Daemon error {}: {}", status, message),
        other => eyre::eyre!("Unexpected reply: {:?}", other),
    }
}

impl SectorClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(get_socket_path())
    }

    /// Create a client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sector status as seen by a mesa
    pub async fn status(&self, mesa_id: MesaId) -> Result<SectorStatus> {
        debug!(mesa_id, "SectorClient: status");
        self.expect_sector(SectorRequest::Status { mesa_id }).await
    }

    /// Activate or deactivate an indicator of the calling mesa
    pub async fn set_active(&self, mesa_id: MesaId, indicator: &str, active: bool) -> Result<SectorStatus> {
        debug!(mesa_id, %indicator, active, "SectorClient: set_active");
        self.expect_sector(SectorRequest::SetActive {
            mesa_id,
            indicator: indicator.to_string(),
            active,
        })
        .await
    }

    /// Apply a delta to an indicator of the target mesa
    pub async fn apply_delta(
        &self,
        mesa_id: MesaId,
        indicator: &str,
        target_mesa_id: Option<MesaId>,
        delta: i64,
    ) -> Result<SectorStatus> {
        debug!(mesa_id, %indicator, ?target_mesa_id, delta, "SectorClient: apply_delta");
        self.expect_sector(SectorRequest::ApplyDelta {
            mesa_id,
            indicator: indicator.to_string(),
            target_mesa_id,
            delta: Some(delta),
        })
        .await
    }

    /// Defeat tally across all sectors
    pub async fn summary(&self) -> Result<IndicatorSummary> {
        debug!("SectorClient: summary");
        match self.request(SectorRequest::Summary).await? {
            SectorReply::Summary { summary } => Ok(summary),
            other => Err(unexpected(other)),
        }
    }

    /// Recorded defeat notifications
    pub async fn defeats(&self) -> Result<Vec<DefeatRecord>> {
        debug!("SectorClient: defeats");
        match self.request(SectorRequest::Defeats).await? {
            SectorReply::Defeats { defeats } => Ok(defeats),
            other => Err(unexpected(other)),
        }
    }

    /// Register a table
    pub async fn register_table(&self, mesa_id: MesaId) -> Result<()> {
        debug!(mesa_id, "SectorClient: register_table");
        self.expect_ok(SectorRequest::RegisterTable { mesa_id }).await
    }

    /// Mark a table disconnected or reconnected
    pub async fn set_disconnected(&self, mesa_id: MesaId, disconnected: bool) -> Result<()> {
        debug!(mesa_id, disconnected, "SectorClient: set_disconnected");
        self.expect_ok(SectorRequest::SetDisconnected { mesa_id, disconnected })
            .await
    }

    /// Remove a table
    pub async fn remove_table(&self, mesa_id: MesaId) -> Result<()> {
        debug!(mesa_id, "SectorClient: remove_table");
        self.expect_ok(SectorRequest::RemoveTable { mesa_id }).await
    }

    /// Registered tables
    pub async fn list_tables(&self) -> Result<Vec<TableEntry>> {
        debug!("SectorClient: list_tables");
        match self.request(SectorRequest::ListTables).await? {
            SectorReply::Tables { tables } => Ok(tables),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the daemon to write its snapshot now
    pub async fn save(&self) -> Result<()> {
        debug!("SectorClient: save");
        self.expect_ok(SectorRequest::Save).await
    }

    /// Check if daemon is alive and get its version
    pub async fn ping(&self) -> Result<String> {
        debug!("SectorClient: ping");
        match self.request(SectorRequest::Ping).await? {
            SectorReply::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Request daemon to shutdown gracefully
    pub async fn shutdown(&self) -> Result<()> {
        debug!("SectorClient: shutdown");
        self.expect_ok(SectorRequest::Shutdown).await
    }

    async fn expect_sector(&self, request: SectorRequest) -> Result<SectorStatus> {
        match self.request(request).await? {
            SectorReply::Sector { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    async fn expect_ok(&self, request: SectorRequest) -> Result<()> {
        match self.request(request).await? {
            SectorReply::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Send a request and return the raw reply, including error replies
    pub async fn request(&self, request: SectorRequest) -> Result<SectorReply> {
        debug!(?self.socket_path, ?request, "SectorClient: sending request");

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to daemon socket")?;

        let request_json = serde_json::to_string(&request).context("Failed to serialize request")?;
        if request_json.len() > MAX_REQUEST_SIZE {
            return Err(eyre::eyre!("Request too large: {} bytes", request_json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            stream
                .write_all(request_json.as_bytes())
                .await
                .context("Failed to write request")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new(&mut stream);
        let mut reply_line = String::new();
        tokio::time::timeout(self.timeout, reader.read_line(&mut reply_line))
            .await
            .context("Read timeout")?
            .context("Failed to read reply")?;

        if reply_line.trim().is_empty() {
            return Err(eyre::eyre!("Daemon closed the connection without replying"));
        }

        let reply: SectorReply = serde_json::from_str(reply_line.trim()).context("Failed to parse daemon reply")?;
        debug!(?reply, "SectorClient: received reply");
        Ok(reply)
    }
}
