//! tilesource - serve single-file tile archives to map renderers
//!
//! This library lets a tile-rendering engine consume archive tiles as if
//! they came from a networked tile service. Several map layers can point at
//! the same archive and share one connection, one copy of its metadata,
//! a bounded cache of decoded raster tiles and a pool of vector tile
//! parsing workers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilesource::config::SourceOptions;
//! use tilesource::coord::{CanonicalTileId, OverscaledTileId};
//! use tilesource::registry::SharedResourceRegistry;
//! use tilesource::source::ArchiveTileSource;
//! use tilesource::tile::Tile;
//!
//! # async fn run() -> Result<(), tilesource::error::SourceError> {
//! let source = ArchiveTileSource::new(
//!     "basemap",
//!     SourceOptions::new("file:///data/basemap.pmtiles"),
//!     SharedResourceRegistry::global(),
//! );
//! source.load().await?;
//!
//! let id = CanonicalTileId::new(3, 4, 2);
//! if source.has_tile(&id) {
//!     let tile = Tile::new(OverscaledTileId::from_canonical(id));
//!     source.load_tile(&tile).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod bounds;
pub mod config;
pub mod coord;
pub mod decode;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod tile;
pub mod worker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
