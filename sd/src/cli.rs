//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::data_dir;
use crate::domain::{IndicatorKey, MesaId};

/// sectord - sector indicator coordination daemon
#[derive(Parser)]
#[command(
    name = "sd",
    about = "Coordinates shared boss indicators between tables of a sector",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Daemon socket (overrides server.socket-path)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Serve,

    /// Show the sector as seen by a mesa
    Status {
        /// Viewing mesa
        mesa: MesaId,
    },

    /// Put one of the mesa's indicators in play
    Activate {
        /// Owning mesa
        mesa: MesaId,

        /// Indicator (mangog, gate)
        indicator: IndicatorKey,

        /// Deactivate instead
        #[arg(long)]
        off: bool,
    },

    /// Apply a damage/heal delta to an indicator
    Delta {
        /// Contributing mesa
        mesa: MesaId,

        /// Indicator (mangog, gate)
        indicator: IndicatorKey,

        /// Signed change (negative is damage)
        #[arg(allow_negative_numbers = true)]
        delta: i64,

        /// Mesa owning the indicator (defaults to the contributing mesa)
        #[arg(short, long)]
        target: Option<MesaId>,
    },

    /// Defeat tally per sector
    Summary,

    /// Recorded defeat notifications
    Defeats,

    /// Manage registered tables
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },

    /// List registered tables
    Tables,

    /// Write the daemon snapshot now
    Save,

    /// Ping the daemon to check if it's alive and responsive
    Ping,

    /// Stop the daemon
    Shutdown,
}

/// Table registry subcommands
#[derive(Debug, Subcommand)]
pub enum TableCommand {
    /// Register a table
    Register { mesa: MesaId },

    /// Mark a table as disconnected
    Disconnect { mesa: MesaId },

    /// Mark a table as connected again
    Reconnect { mesa: MesaId },

    /// Remove a table
    Remove { mesa: MesaId },
}

/// Path of the daemon log file
pub fn get_log_path() -> PathBuf {
    data_dir().join("logs").join("sectord.log")
}

/// Output format for query commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
