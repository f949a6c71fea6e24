//! Config file handling for the CLI

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use timewarp_core::TimewarpConfig;

/// File looked for in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "timewarp.toml";

/// Load `path`, or `timewarp.toml` if present, or the defaults
pub fn load(path: Option<&Path>) -> Result<TimewarpConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.exists() {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                return Ok(TimewarpConfig::default());
            }
            fallback
        }
    };

    TimewarpConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Write the default configuration to `path`
pub fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let content =
        toml::to_string_pretty(&TimewarpConfig::default()).context("Failed to serialize config")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
