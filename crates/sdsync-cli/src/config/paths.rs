//! Config directory resolution.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolves the config file path.
///
/// - If `dir` is `Some`, returns `{dir}/config.toml`.
/// - Otherwise returns `~/.config/sdsync/config.toml`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined (when `dir` is `None`).
pub fn resolve_config_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(d) = dir {
        return Ok(d.join("config.toml"));
    }

    let home = std::env::var("HOME").context("HOME environment variable is not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("sdsync")
        .join("config.toml"))
}

/// Resolves the XMLTV output path.
///
/// An explicit `--output` wins, then the configured path, then
/// `{dir}/xmltv.xml`, then `xmltv.xml` in the working directory.
#[must_use]
pub fn resolve_output_path(
    explicit: Option<PathBuf>,
    configured: Option<&PathBuf>,
    dir: Option<&PathBuf>,
) -> PathBuf {
    explicit
        .or_else(|| configured.cloned())
        .unwrap_or_else(|| {
            dir.map_or_else(|| PathBuf::from("xmltv.xml"), |d| d.join("xmltv.xml"))
        })
}
