//! Configuration file handling for ~/.tilesource/config.ini.
//!
//! ```ini
//! [registry]
//! tile_cache_size = 1000
//! worker_pool_size = 4
//!
//! [source]
//! tile_size = 512
//! scheme = xyz
//! ```

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{RegistryConfig, Scheme, DEFAULT_TILE_SIZE};

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// User configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// `[registry]` section
    pub registry: RegistryConfig,
    /// `[source] tile_size`
    pub tile_size: u32,
    /// `[source] scheme`
    pub scheme: Scheme,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            tile_size: DEFAULT_TILE_SIZE,
            scheme: Scheme::Xyz,
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.tilesource/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigFileError::WriteError(e.to_string()))?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("registry"))
            .set(
                "tile_cache_size",
                self.registry.tile_cache_capacity.to_string(),
            )
            .set("worker_pool_size", self.registry.worker_pool_size.to_string());
        ini.with_section(Some("source"))
            .set("tile_size", self.tile_size.to_string())
            .set("scheme", self.scheme.to_string());

        ini.write_to_file(path)
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_positive(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(section, key, value, "must be a positive integer")),
    }
}

/// Starts from defaults and overlays any values found in the INI.
fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("registry")) {
        if let Some(v) = section.get("tile_cache_size") {
            config.registry.tile_cache_capacity = parse_positive("registry", "tile_cache_size", v)?;
        }
        if let Some(v) = section.get("worker_pool_size") {
            config.registry.worker_pool_size = parse_positive("registry", "worker_pool_size", v)?;
        }
    }

    if let Some(section) = ini.section(Some("source")) {
        if let Some(v) = section.get("tile_size") {
            let size = parse_positive("source", "tile_size", v)?;
            config.tile_size = u32::try_from(size)
                .map_err(|_| invalid("source", "tile_size", v, "value too large"))?;
        }
        if let Some(v) = section.get("scheme") {
            config.scheme = v
                .parse()
                .map_err(|_| invalid("source", "scheme", v, "must be 'xyz' or 'tms'"))?;
        }
    }

    Ok(config)
}

/// Get the path to the config directory (~/.tilesource).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilesource")
}

/// Get the path to the config file (~/.tilesource/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
