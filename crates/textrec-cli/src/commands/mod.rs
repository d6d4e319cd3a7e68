//! CLI subcommands.

pub mod config;
pub mod recognize;

use std::path::{Path, PathBuf};

use textrec_core::TextrecConfig;

/// Location of the user configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("textrec")
        .join("config.json")
}

/// Load the config at `path`, else the user config file, else defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<TextrecConfig> {
    if let Some(path) = path {
        return Ok(TextrecConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        Ok(TextrecConfig::from_file(&default_path)?)
    } else {
        Ok(TextrecConfig::default())
    }
}
