//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Write a default configuration file. Refuses to overwrite unless forced.
pub fn cmd_init(config_path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let mut config = Config::default();
    if let Some(path) = config_path {
        config.paths.config_file = path.to_path_buf();
    }

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {} (use --force to overwrite)",
            config.paths.config_file.display()
        )));
    }

    config.save()?;
    info!("Initialized configuration");
    Ok(config.paths.config_file.clone())
}

/// Print init confirmation to console
pub fn print_init(path: &Path) {
    println!("\n✨ Wrote default config to {}", path.display());
    println!("Edit it to point data_path at your corpus export, then run 'supportmind status'.");
}
