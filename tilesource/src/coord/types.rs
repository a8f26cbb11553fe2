//! Tile identifier types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.051_128_779_806_59;
pub const MAX_LAT: f64 = 85.051_128_779_806_59;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Highest zoom level with a precomputed world size.
pub const MAX_TABLE_ZOOM: u8 = 24;

/// Canonical tile address in the xyz tile pyramid.
///
/// The origin is the north-west corner of the world; `x` grows eastward and
/// `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalTileId {
    /// Zoom level
    pub z: u8,
    /// X coordinate (east-west), 0 at west
    pub x: u32,
    /// Y coordinate (north-south), 0 at north
    pub y: u32,
}

impl CanonicalTileId {
    /// Creates a canonical tile id.
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Returns the y coordinate flipped into the TMS convention (origin south-west).
    pub fn tms_y(&self) -> u32 {
        let dim = 1u64 << self.z.min(31);
        (dim - 1 - u64::from(self.y).min(dim - 1)) as u32
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Tile id as requested by a renderer.
///
/// When the renderer zooms in past the archive's maximum zoom it keeps
/// requesting the deepest canonical tile and draws it at `overscaled_z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverscaledTileId {
    /// Zoom level the tile is displayed at (>= `canonical.z`).
    pub overscaled_z: u8,
    /// World copy index for tiles repeated across the antimeridian.
    pub wrap: i32,
    /// The tile actually stored in the archive.
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    /// Creates an overscaled tile id. `overscaled_z` is raised to at least `canonical.z`.
    pub fn new(overscaled_z: u8, wrap: i32, canonical: CanonicalTileId) -> Self {
        Self {
            overscaled_z: overscaled_z.max(canonical.z),
            wrap,
            canonical,
        }
    }

    /// Shorthand for a tile displayed at its own zoom level.
    pub fn from_canonical(canonical: CanonicalTileId) -> Self {
        Self::new(canonical.z, 0, canonical)
    }

    /// How many times larger the tile is drawn than its native size.
    pub fn overscale_factor(&self) -> u32 {
        1u32 << (self.overscaled_z - self.canonical.z).min(31)
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.canonical, self.overscaled_z)
    }
}

/// Errors that can occur when building tile ids from user input.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Column or row is outside the tile grid for the zoom level
    OutOfRange { z: u8, x: u32, y: u32 },
    /// Zoom level cannot be represented in a 32-bit tile grid
    InvalidZoom(u8),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::OutOfRange { z, x, y } => {
                write!(f, "Tile {}/{}/{} is outside the zoom {} grid", z, x, y, z)
            }
            CoordError::InvalidZoom(z) => write!(f, "Invalid zoom level: {}", z),
        }
    }
}

impl std::error::Error for CoordError {}
