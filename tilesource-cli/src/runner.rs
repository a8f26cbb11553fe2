//! CLI runner: configuration, logging and the shared registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::CliError;
use tilesource::config::{ConfigFile, SourceOptions};
use tilesource::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};
use tilesource::registry::SharedResourceRegistry;
use tilesource::source::ArchiveTileSource;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub tile_size: Option<u32>,
    pub workers: Option<usize>,
    pub log_dir: Option<PathBuf>,
}

/// Runner that owns the CLI's logging and registry.
pub struct CliRunner {
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: ConfigFile,
    registry: Arc<SharedResourceRegistry>,
}

impl CliRunner {
    /// Loads configuration, applies overrides and starts logging.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config = resolve_config(options)?;

        let log_dir = options
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_log_dir()));
        let logging_guard = init_logging(&log_dir, default_log_file())
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        if !SharedResourceRegistry::init_global(config.registry.clone()) {
            warn!("Registry already initialised; command-line limits ignored");
        }

        info!("tilesource v{}", tilesource::VERSION);
        Ok(Self {
            logging_guard,
            config,
            registry: SharedResourceRegistry::global(),
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Creates and loads a source for `archive`.
    pub async fn open_source(&self, archive: &Path) -> Result<ArchiveTileSource, CliError> {
        let url = archive.to_string_lossy().to_string();
        let options = SourceOptions::new(url)
            .with_tile_size(self.config.tile_size)
            .with_scheme(self.config.scheme);
        let source = ArchiveTileSource::new("cli", options, Arc::clone(&self.registry));
        source.load().await.map_err(CliError::Load)?;
        Ok(source)
    }
}

/// Config file values with command-line overrides applied.
pub fn resolve_config(options: &GlobalOptions) -> Result<ConfigFile, CliError> {
    let mut config = match &options.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    if let Some(size) = options.tile_size {
        if size == 0 {
            return Err(CliError::Config("--tile-size must be positive".to_string()));
        }
        config.tile_size = size;
    }
    if let Some(workers) = options.workers {
        config.registry = config.registry.with_worker_pool_size(workers);
    }
    Ok(config)
}
