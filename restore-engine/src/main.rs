//! Restore Engine - Main entry point
//!
//! Lists backups, runs restores and shows restore history.

use anyhow::Result;
use clap::{Parser, Subcommand};
use restore_engine::{
    config::Config, daemon::ShutdownCoordinator, transfer::format_bytes, utils, ConflictStrategy,
    RestoreEngine, RestoreHandle, RestoreRequest,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List backups in the catalog, newest first
    List,

    /// Restore a backup into a directory
    Restore {
        /// Backup id
        backup_id: String,

        /// Destination directory (defaults to restore.restore_root)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Conflict strategy: overwrite, skip, rename or prompt
        #[arg(short, long)]
        strategy: Option<ConflictStrategy>,

        /// Only restore paths matching these globs
        #[arg(long = "include", value_name = "GLOB")]
        include: Vec<String>,

        /// Never restore paths matching these globs
        #[arg(long = "exclude", value_name = "GLOB")]
        exclude: Vec<String>,

        /// Overwrite conflicting files
        #[arg(long)]
        overwrite: bool,

        /// Skip integrity checks before and after the restore
        #[arg(long)]
        no_verify: bool,

        /// Take an incremental backup of the current state first
        #[arg(long)]
        create_backup: bool,
    },

    /// Show restore history and statistics
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Only entries for this backup id
        #[arg(long)]
        backup: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting restore-engine v{}", env!("CARGO_PKG_VERSION"));

    let grace = Duration::from_secs(config.daemon.shutdown_grace_secs);
    let engine = RestoreEngine::new(config, None).await?;

    match args.command {
        Command::List => list(&engine).await,
        Command::History { limit, backup } => history(&engine, limit, backup).await,
        Command::Restore {
            backup_id,
            target,
            strategy,
            include,
            exclude,
            overwrite,
            no_verify,
            create_backup,
        } => {
            let request = RestoreRequest {
                backup_id,
                target_path: target,
                selective: !include.is_empty(),
                file_patterns: include,
                exclude_patterns: exclude,
                overwrite,
                conflict_strategy: strategy,
                verify_integrity: !no_verify,
                create_backup,
            };
            restore(&engine, request, ShutdownCoordinator::new(grace)).await
        }
    }
}

async fn list(engine: &RestoreEngine) -> Result<()> {
    for backup in engine.list_backups().await? {
        let created = chrono::DateTime::from_timestamp_millis(backup.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| backup.timestamp.to_string());
        println!(
            "{:<36} {:<12} {:>12}  {}  {}{}{}",
            backup.id,
            backup.backup_type,
            format_bytes(backup.size),
            created,
            if backup.available { "available" } else { "unavailable" },
            if backup.compressed { " compressed" } else { "" },
            if backup.encrypted { " encrypted" } else { "" },
        );
    }
    Ok(())
}

async fn history(engine: &RestoreEngine, limit: usize, backup: Option<String>) -> Result<()> {
    let entries = match backup {
        Some(id) => engine.history_for_backup(&id).await,
        None => engine.recent_history(limit).await,
    };
    let report = serde_json::json!({
        "statistics": engine.statistics().await,
        "entries": entries,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn restore(
    engine: &RestoreEngine,
    request: RestoreRequest,
    coordinator: ShutdownCoordinator,
) -> Result<()> {
    let RestoreHandle {
        session_id,
        mut events,
        join,
    } = engine.start_restore(request).await?;
    tracing::info!(session_id = %session_id, "Restore started");

    // Print events as JSON lines until the session drops its sender
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        }
    });

    let outcome = tokio::select! {
        result = join => Some(result),
        _ = coordinator.wait_for_signal() => None,
    };

    let result = match outcome {
        Some(result) => result,
        None => {
            coordinator.shutdown(engine).await?;
            anyhow::bail!("restore {} interrupted by shutdown", session_id);
        }
    };

    if let Err(e) = printer.await {
        tracing::warn!("Event printer stopped abnormally: {}", e);
    }

    match result {
        Ok(Ok(session)) => {
            tracing::info!(
                session_id = %session.id,
                "Restored {} files, skipped {}, {} errors",
                session.restored_files.len(),
                session.skipped_files.len(),
                session.errors.len()
            );
            engine.shutdown(Duration::ZERO).await?;
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("restore task failed: {}", e)),
    }
}
