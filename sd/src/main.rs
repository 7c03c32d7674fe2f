//! sectord - sector indicator coordination daemon
//!
//! CLI entry point: runs the daemon (`sd serve`) or talks to a running one.

use std::fs;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use sectord::cli::{Cli, Command, OutputFormat, TableCommand, get_log_path};
use sectord::config::Config;
use sectord::daemon::SectorDaemon;
use sectord::domain::{Indicator, IndicatorKey, IndicatorSummary, SectorStatus};
use sectord::ipc::SectorClient;
use sectord::ipc::listener::{cleanup_socket, create_listener_at};
use sectord::registry::{DefeatRecord, TableEntry};

fn parse_level(level_str: Option<&str>, default: tracing::Level) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to {}", s, default);
                default
            }
        },
        None => default,
    }
}

/// Daemon logs go to a file; client commands log to stderr and stay quiet by default
fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_file: bool) -> Result<()> {
    // Priority: CLI --log-level > config file > default
    let level_str = cli_log_level.or(config_log_level);

    if to_file {
        let level = parse_level(level_str, tracing::Level::INFO);
        let log_path = get_log_path();
        if let Some(log_dir) = log_path.parent() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }
        let log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .context("Failed to open log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
            .init();
        info!("Logging initialized (level: {:?})", level);
    } else {
        let level = parse_level(level_str, tracing::Level::WARN);
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let serving = matches!(cli.command, Command::Serve);
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), serving).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(socket) = &cli.socket {
        config.server.socket_path = socket.clone();
    }

    let client = SectorClient::with_socket_path(config.server.socket_path.clone());
    let format = cli.format;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve => cmd_serve(&config).await,
        Command::Status { mesa } => {
            let status = client.status(mesa).await?;
            print_status(&status, mesa, &format)
        }
        Command::Activate { mesa, indicator, off } => {
            let status = client.set_active(mesa, indicator.as_str(), !off).await?;
            print_status(&status, mesa, &format)
        }
        Command::Delta {
            mesa,
            indicator,
            delta,
            target,
        } => {
            let status = client.apply_delta(mesa, indicator.as_str(), target, delta).await?;
            print_status(&status, mesa, &format)
        }
        Command::Summary => {
            let summary = client.summary().await?;
            print_summary(&summary, &format)
        }
        Command::Defeats => {
            let defeats = client.defeats().await?;
            print_defeats(&defeats, &format)
        }
        Command::Table { command } => cmd_table(&client, command).await,
        Command::Tables => {
            let tables = client.list_tables().await?;
            print_tables(&tables, &format)
        }
        Command::Save => {
            client.save().await?;
            println!("Snapshot saved");
            Ok(())
        }
        Command::Ping => {
            let version = client.ping().await?;
            println!("Daemon is alive and responsive");
            println!("Version: {}", version);
            Ok(())
        }
        Command::Shutdown => {
            client.shutdown().await?;
            println!("Daemon stopping");
            Ok(())
        }
    }
}

/// Run the daemon until Shutdown, SIGINT or SIGTERM
async fn cmd_serve(config: &Config) -> Result<()> {
    debug!("cmd_serve: called");
    info!("Daemon starting...");

    let (listener, socket_path) = create_listener_at(&config.server.socket_path)?;
    info!(?socket_path, "IPC socket listening");

    let (daemon, shutdown_rx) = match SectorDaemon::start(config).await {
        Ok(started) => started,
        Err(e) => {
            cleanup_socket(&socket_path);
            return Err(e);
        }
    };
    let shutdown_tx = daemon.shutdown_handle();
    let mut daemon_handle = tokio::spawn(daemon.run(listener, shutdown_rx));
    info!("Daemon running. Press Ctrl+C to stop.");

    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let result = tokio::select! {
        res = &mut daemon_handle => res,
        _ = sigint.recv() => {
            warn!("SIGINT received");
            let _ = shutdown_tx.send(()).await;
            daemon_handle.await
        }
        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            let _ = shutdown_tx.send(()).await;
            daemon_handle.await
        }
    };

    debug!("cmd_serve: cleaning up IPC socket");
    cleanup_socket(&socket_path);

    result.context("Daemon task failed")??;
    info!("Daemon shutdown complete");
    Ok(())
}

async fn cmd_table(client: &SectorClient, command: TableCommand) -> Result<()> {
    debug!(?command, "cmd_table: called");
    let (mesa, verb) = match command {
        TableCommand::Register { mesa } => {
            client.register_table(mesa).await?;
            (mesa, "registered")
        }
        TableCommand::Disconnect { mesa } => {
            client.set_disconnected(mesa, true).await?;
            (mesa, "disconnected")
        }
        TableCommand::Reconnect { mesa } => {
            client.set_disconnected(mesa, false).await?;
            (mesa, "reconnected")
        }
        TableCommand::Remove { mesa } => {
            client.remove_table(mesa).await?;
            (mesa, "removed")
        }
    };
    println!("Mesa {} {}", mesa, verb);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe(indicator: &Indicator) -> String {
    let label = format!("{:<7}{:>5}", indicator.key.as_str(), indicator.value);
    if indicator.defeated {
        format!("{} {}", label, "defeated".red())
    } else if let Some(owner) = indicator.active_owner {
        format!("{} {}", label, format!("active (mesa {})", owner).green())
    } else {
        format!("{} {}", label, "dormant".dimmed())
    }
}

fn print_status(status: &SectorStatus, viewer: u32, format: &OutputFormat) -> Result<()> {
    if *format == OutputFormat::Json {
        return print_json(status);
    }

    println!("{}", format!("Sector {} (seen by mesa {})", status.sector_id, viewer).bold());
    if status.mesas.is_empty() {
        println!("  no registered mesas visible");
    }
    for mesa in &status.mesas {
        let Some(indicators) = status.indicators_by_mesa.get(mesa) else {
            continue;
        };
        let cells: Vec<String> = IndicatorKey::ALL
            .iter()
            .map(|key| describe(indicators.get(*key)))
            .collect();
        println!("  mesa {:<4} {}", mesa, cells.join("   "));
    }
    Ok(())
}

fn print_summary(summary: &IndicatorSummary, format: &OutputFormat) -> Result<()> {
    if *format == OutputFormat::Json {
        return print_json(summary);
    }

    if summary.by_sector.is_empty() {
        println!("No registered mesas");
        return Ok(());
    }
    println!("{:<8} {:>6} {:>8} {:>6}", "SECTOR", "MESAS", "MANGOG", "GATE");
    for (sector, tally) in &summary.by_sector {
        println!(
            "{:<8} {:>6} {:>8} {:>6}",
            sector, tally.total_mesas, tally.mangog_defeated, tally.gate_defeated
        );
    }
    Ok(())
}

fn print_defeats(defeats: &[DefeatRecord], format: &OutputFormat) -> Result<()> {
    if *format == OutputFormat::Json {
        return print_json(&defeats);
    }

    if defeats.is_empty() {
        println!("No defeats recorded");
        return Ok(());
    }
    for record in defeats {
        let when = chrono::DateTime::from_timestamp_millis(record.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.timestamp.to_string());
        println!("{}  mesa {:<4} {}", when, record.mesa_id, record.avatar_name.red());
    }
    Ok(())
}

fn print_tables(tables: &[TableEntry], format: &OutputFormat) -> Result<()> {
    if *format == OutputFormat::Json {
        return print_json(&tables);
    }

    if tables.is_empty() {
        println!("No registered tables");
        return Ok(());
    }
    for table in tables {
        let state = if table.disconnected {
            "disconnected".yellow()
        } else {
            "connected".green()
        };
        println!("mesa {:<4} {}", table.mesa_id, state);
    }
    Ok(())
}
