//! Inter-Process Communication with the sector daemon
//!
//! Scoreboard clients and the `sd` CLI connect to the daemon's Unix Domain
//! Socket and exchange one JSON line per request and reply.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::SectorClient;
pub use messages::{SectorReply, SectorRequest};

use crate::config::ServerConfig;

/// Default socket path for daemon IPC
pub fn get_socket_path() -> PathBuf {
    ServerConfig::default().socket_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_ends_with_sectord_sock() {
        let path = get_socket_path();
        assert!(path.ends_with("sectord/sectord.sock"));
    }
}
