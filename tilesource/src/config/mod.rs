//! Configuration types for tile-source components.
//!
//! - [`RegistryConfig`]: process-wide limits shared by every source
//! - [`SourceOptions`]: per-layer options passed to a tile source
//! - [`ConfigFile`]: user configuration loaded from `config.ini`
//!
//! # Example
//!
//! ```
//! use tilesource::config::{RegistryConfig, Scheme, SourceOptions};
//!
//! let registry = RegistryConfig::default().with_worker_pool_size(8);
//! let options = SourceOptions::new("file:///data/basemap.pmtiles")
//!     .with_tile_size(256)
//!     .with_scheme(Scheme::Xyz);
//! assert_eq!(registry.worker_pool_size, 8);
//! assert_eq!(options.tile_size, 256);
//! ```

mod file;

pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::worker::PromoteId;

/// Default number of decoded raster tiles kept in memory.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 1000;

/// Default number of vector tile worker threads.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default zoom range before the archive header is read.
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 22;

/// Process-wide registry configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of decoded raster tiles held in the tile cache.
    pub tile_cache_capacity: usize,
    /// Number of vector tile worker threads.
    pub worker_pool_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tile_cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl RegistryConfig {
    /// Set the tile cache capacity (at least 1).
    pub fn with_tile_cache_capacity(mut self, capacity: usize) -> Self {
        self.tile_cache_capacity = capacity.max(1);
        self
    }

    /// Set the worker pool size (at least 1).
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }
}

/// Tile row numbering used by the archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    /// Row 0 at the north edge.
    #[default]
    Xyz,
    /// Row 0 at the south edge.
    Tms,
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xyz" => Ok(Scheme::Xyz),
            "tms" => Ok(Scheme::Tms),
            other => Err(format!("unknown scheme '{}'", other)),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Xyz => f.write_str("xyz"),
            Scheme::Tms => f.write_str("tms"),
        }
    }
}

/// Options for one tile source (one map layer).
#[derive(Clone, Debug, PartialEq)]
pub struct SourceOptions {
    /// Archive location. Used verbatim as the registry key.
    pub url: String,
    /// Tile size in pixels.
    pub tile_size: u32,
    pub scheme: Scheme,
    /// Zoom range used until the archive header says otherwise.
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Style scope forwarded to vector workers.
    pub scope: String,
    pub promote_id: Option<PromoteId>,
    pub show_collision_boxes: bool,
    pub shadow_casters: bool,
    /// When set, vector tiles expire this long after loading.
    pub tile_ttl: Option<Duration>,
}

impl SourceOptions {
    /// Options with defaults for everything but the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tile_size: DEFAULT_TILE_SIZE,
            scheme: Scheme::Xyz,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            scope: String::new(),
            promote_id: None,
            show_collision_boxes: false,
            shadow_casters: false,
            tile_ttl: None,
        }
    }

    /// Set the tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    /// Set the row scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the initial zoom range.
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    /// Set the style scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the promoted feature id property.
    pub fn with_promote_id(mut self, promote_id: PromoteId) -> Self {
        self.promote_id = Some(promote_id);
        self
    }

    /// Enable collision box debugging in workers.
    pub fn with_collision_boxes(mut self, enabled: bool) -> Self {
        self.show_collision_boxes = enabled;
        self
    }

    /// Enable shadow caster extraction in workers.
    pub fn with_shadow_casters(mut self, enabled: bool) -> Self {
        self.shadow_casters = enabled;
        self
    }

    /// Track tile freshness with the given lifetime.
    pub fn with_tile_ttl(mut self, ttl: Duration) -> Self {
        self.tile_ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.tile_cache_capacity, 1000);
        assert_eq!(config.worker_pool_size, 4);
    }

    #[test]
    fn test_registry_zero_values_clamped() {
        let config = RegistryConfig::default()
            .with_tile_cache_capacity(0)
            .with_worker_pool_size(0);
        assert_eq!(config.tile_cache_capacity, 1);
        assert_eq!(config.worker_pool_size, 1);
    }

    #[test]
    fn test_source_defaults() {
        let options = SourceOptions::new("file:///a.pmtiles");
        assert_eq!(options.url, "file:///a.pmtiles");
        assert_eq!(options.tile_size, 512);
        assert_eq!(options.scheme, Scheme::Xyz);
        assert!(options.tile_ttl.is_none());
    }

    #[test]
    fn test_zoom_range_is_ordered() {
        let options = SourceOptions::new("a").with_zoom_range(8, 3);
        assert_eq!(options.min_zoom, 8);
        assert_eq!(options.max_zoom, 8);
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("XYZ".parse::<Scheme>(), Ok(Scheme::Xyz));
        assert_eq!(" tms ".parse::<Scheme>(), Ok(Scheme::Tms));
        assert!("wmts".parse::<Scheme>().is_err());
        assert_eq!(Scheme::Tms.to_string(), "tms");
    }
}
