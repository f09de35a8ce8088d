//! clipkeep - clipboard history daemon and maintenance commands

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use clipkeep::clipboard_history::{
    export_to_file, import_from_file, AssetCleaner, ClipboardEngine, ClipboardItem, EngineDeps,
    EngineSettings, HistoryStore, ImageAssetStore, ItemQuery, RetentionPolicy, RetentionSweeper,
    SaveOutcome, SystemClipboard,
};
use clipkeep::config::{self, Config};
use clipkeep::error::ClipKeepError;
use clipkeep::logging;
use clipkeep::platform::{
    FrontmostAppProvider, HeadlessSurface, SystemInputSynthesizer, SystemPermissions,
};
use clipkeep::scheduler::{Clock, SystemClock, ThreadScheduler};
use clipkeep::stdin_commands;

/// Characters of text shown per item by `list`
const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Parser)]
#[command(name = "clipkeep", version, about = "Clipboard history capture engine")]
struct Cli {
    /// Config file to use instead of ~/.clipkeep/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the clipboard until stdin closes or a quit command arrives
    Run,
    /// Print the most recent history items
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Write history as JSON (concealed and image items are left out)
    Export { file: PathBuf },
    /// Merge a JSON export into history
    Import { file: PathBuf },
    /// Delete unpinned items older than N days (defaults to retentionDays)
    Purge {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Delete every history item and its image files
    Clear,
}

fn main() {
    let cli = Cli::parse();
    // Logging first, so config load problems reach the log file.
    let _guard = logging::init(&config::default_logs_dir());
    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    if config.logs_dir() != config::default_logs_dir() {
        info!(
            logs_dir = %config::default_logs_dir().display(),
            data_dir = %config.data_dir().display(),
            "Custom data directory set, logs stay in the default location"
        );
    }

    if let Err(e) = dispatch(cli.command, &config) {
        match e.downcast_ref::<ClipKeepError>() {
            Some(known) => {
                tracing::error!(severity = ?known.severity(), error = %known, "Command failed");
                eprintln!("clipkeep: {}", known.user_message());
            }
            None => {
                tracing::error!(error = %e, "Command failed");
                eprintln!("clipkeep: {:#}", e);
            }
        }
        std::process::exit(1);
    }
}

fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Run => run_daemon(config),
        Command::List { limit } => list(config, limit),
        Command::Export { file } => export(config, &file),
        Command::Import { file } => import(config, &file),
        Command::Purge { days } => purge(config, days.unwrap_or(config.retention_days)),
        Command::Clear => clear(config),
    }
}

fn open_store(config: &Config) -> Result<HistoryStore> {
    HistoryStore::open(&config.database_path())
}

fn open_assets(config: &Config) -> Result<ImageAssetStore> {
    let assets = ImageAssetStore::new(config.assets_dir(), config.image_limits())
        .map_err(ClipKeepError::from)?;
    Ok(assets)
}

fn run_daemon(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let assets = open_assets(config)?;
    let deps = EngineDeps {
        clipboard: Arc::new(SystemClipboard::new()),
        permissions: Arc::new(SystemPermissions),
        synthesizer: Arc::new(SystemInputSynthesizer),
        surface: Arc::new(HeadlessSurface),
        source_apps: Arc::new(FrontmostAppProvider),
        scheduler: Arc::new(ThreadScheduler::new()),
        clock: Arc::new(SystemClock),
    };

    let engine = ClipboardEngine::new(EngineSettings::from_config(config), store, assets, deps)?;
    let mut handle = engine.spawn()?;
    info!(db = %config.database_path().display(), "clipkeep running");

    let commands = stdin_commands::start_stdin_listener();
    while let Ok(command) = commands.recv() {
        match stdin_commands::dispatch(command, &handle) {
            Ok(true) => {}
            Ok(false) => break,
            Err(ClipKeepError::EngineStopped) => {
                warn!("Engine stopped unexpectedly");
                break;
            }
            Err(e) => warn!(error = %e, "Command failed"),
        }
    }

    handle.shutdown();
    info!("clipkeep stopped");
    Ok(())
}

fn list(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let items = store.query(&ItemQuery::all().limit(limit))?;
    for item in &items {
        println!("{}", describe(item));
    }
    if items.is_empty() {
        println!("(history is empty)");
    }
    Ok(())
}

fn describe(item: &ClipboardItem) -> String {
    let when = Local
        .timestamp_millis_opt(item.captured_at)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".to_string());
    let preview = if item.concealed {
        "••••••••".to_string()
    } else {
        let text = item.title.as_deref().or(item.text.as_deref()).unwrap_or("");
        let flat: String = text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .take(PREVIEW_CHARS)
            .collect();
        flat.trim().to_string()
    };
    let pin = if item.pinned { "*" } else { " " };
    format!("{} {} {:<6} {} {}", pin, item.id, item.kind.as_str(), when, preview)
}

fn export(config: &Config, file: &Path) -> Result<()> {
    let store = open_store(config)?;
    let count = export_to_file(&store, file, SystemClock.now_ms()).map_err(ClipKeepError::from)?;
    println!("Exported {} items to {}", count, file.display());
    Ok(())
}

fn import(config: &Config, file: &Path) -> Result<()> {
    let mut store = open_store(config)?;
    let report = import_from_file(&mut store, file).map_err(ClipKeepError::from)?;
    println!(
        "Imported {} items ({} skipped, {} labels created)",
        report.imported, report.skipped, report.labels_created
    );
    Ok(())
}

fn purge(config: &Config, days: u32) -> Result<()> {
    let RetentionPolicy::MaxAge(age) = RetentionPolicy::from_days(days) else {
        println!("Retention is 0 days (keep forever), nothing to purge");
        return Ok(());
    };

    let mut store = open_store(config)?;
    let assets = open_assets(config)?;
    let mut sweeper = RetentionSweeper::new(
        RetentionPolicy::from_days(days),
        Arc::new(ThreadScheduler::new()),
    );
    let purged = sweeper
        .purge_older_than(age, &mut store, &assets, SystemClock.now_ms())
        .map_err(ClipKeepError::from)?;
    println!("Purged {} items older than {} days", purged, days);
    Ok(())
}

fn clear(config: &Config) -> Result<()> {
    let mut store = open_store(config)?;
    let assets = open_assets(config)?;

    let released = store.clear_all().map_err(ClipKeepError::from)?;
    match store.save().map_err(ClipKeepError::from)? {
        SaveOutcome::Committed => {}
        SaveOutcome::Conflict => {
            store.rollback();
            anyhow::bail!("History changed while clearing, nothing was deleted");
        }
    }
    let files = released.len();
    assets.release(released);
    store
        .run_maintenance(true)
        .context("Failed to compact database after clear")?;

    println!("Cleared history ({} image files released)", files);
    Ok(())
}
