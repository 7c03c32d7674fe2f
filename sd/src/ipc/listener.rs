//! IPC listener for the daemon side
//!
//! Provides helpers for creating and managing the Unix Domain Socket listener.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::messages::{SectorRequest, SectorReply};

/// Maximum request size (4KB)
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Create and bind a Unix Domain Socket listener at the given path
///
/// Handles cleanup of stale socket files from previous runs.
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener: creating IPC socket");

    // Ensure parent directory exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    // Clean up stale socket if exists
    if socket_path.exists() {
        debug!(?socket_path, "create_listener: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind IPC socket")?;
    debug!(?socket_path, "create_listener: socket bound successfully");

    Ok((listener, socket_path.to_path_buf()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

/// Read one request line from a connection
pub async fn read_request(stream: &mut UnixStream) -> Result<SectorRequest> {
    // Stop reading one byte past the limit so oversized lines are detected
    let mut reader = BufReader::new(&mut *stream).take(MAX_REQUEST_SIZE as u64 + 1);
    let mut line = String::new();

    let bytes_read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read IPC request")?;

    if bytes_read > MAX_REQUEST_SIZE {
        return Err(eyre::eyre!("Request too large: more than {} bytes", MAX_REQUEST_SIZE));
    }

    if line.trim().is_empty() {
        return Err(eyre::eyre!("Empty request received"));
    }

    let request: SectorRequest = serde_json::from_str(line.trim()).context("Failed to parse IPC request")?;
    debug!(?request, "read_request: parsed request");

    Ok(request)
}

/// Send a reply on the stream
pub async fn send_reply(stream: &mut UnixStream, reply: &SectorReply) -> Result<()> {
    let reply_json = serde_json::to_string(reply).context("Failed to serialize reply")?;
    stream
        .write_all(reply_json.as_bytes())
        .await
        .context("Failed to write reply")?;
    stream.write_all(b"\n").await.context("Failed to write newline")?;
    stream.flush().await.context("Failed to flush reply")?;
    debug!(?reply, "send_reply: sent reply");
    Ok(())
}
