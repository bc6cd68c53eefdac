//! Application configuration module.
//!
//! Manages the TOML config file holding the channel filter, language
//! priority, output path and API overrides.

#[allow(clippy::module_inception)]
mod config;
mod paths;

#[allow(clippy::module_name_repetitions)]
pub use config::AppConfig;
pub use paths::{resolve_config_path, resolve_output_path};
