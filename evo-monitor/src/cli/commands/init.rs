//! Init command for writing a starter configuration

use anyhow::{Result, bail};
use evo_monitor_core::MonitorConfig;
use std::path::Path;
use tracing::info;

pub fn execute(output: &Path) -> Result<()> {
    if output.exists() {
        bail!("{} already exists, refusing to overwrite", output.display());
    }

    MonitorConfig::default().save(output)?;
    info!("Wrote default configuration to {:?}", output);
    println!("Configuration written to {}", output.display());

    Ok(())
}
