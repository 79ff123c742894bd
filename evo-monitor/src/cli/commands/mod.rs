// Command implementations

pub mod init;
pub mod watch;

use anyhow::Result;
use evo_monitor_core::MonitorConfig;
use std::path::Path;
use tracing::debug;

/// Configuration from `--config`, or defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    match path {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            MonitorConfig::from_file(path)
        }
        None => Ok(MonitorConfig::default()),
    }
}
