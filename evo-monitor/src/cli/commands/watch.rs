//! Watch command: run the monitor until interrupted

use anyhow::{Context, Result};
use evo_monitor_core::{FileOperationMonitor, MonitorConfig};
use std::path::PathBuf;
use tracing::info;

pub async fn execute(mut config: MonitorConfig, path: Option<PathBuf>, journal: Option<PathBuf>) -> Result<()> {
    if let Some(path) = path {
        config.root = path;
    }
    if let Some(journal) = journal {
        config.journal_path = journal;
    }

    let root = config.root.clone();
    let journal = config.journal_path.clone();
    let mut monitor = FileOperationMonitor::from_config(config);
    monitor.start_monitoring().with_context(|| format!("Failed to watch {}", root.display()))?;

    info!("Watching {:?}, lessons go to {:?}. Press Ctrl-C to stop.", root, journal);
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    monitor.stop_monitoring().await;

    let stats = serde_json::to_string_pretty(&monitor.get_statistics())?;
    info!("Final statistics:\n{}", stats);

    Ok(())
}
