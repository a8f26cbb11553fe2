//! Coordinate conversion module
//!
//! Provides tile identifiers and the normalized Web Mercator projection used
//! by the bounds filter. Projected coordinates are in `[0, 1] × [0, 1]` with
//! the origin at the north-west corner of the world.

mod types;

pub use types::{
    CanonicalTileId, CoordError, OverscaledTileId, MAX_LAT, MAX_LON, MAX_TABLE_ZOOM, MIN_LAT,
    MIN_LON,
};

use std::f64::consts::PI;

/// Number of tiles along one axis for zoom levels 0..=24.
const WORLD_SIZE_TABLE: [f64; MAX_TABLE_ZOOM as usize + 1] = {
    let mut table = [0.0; MAX_TABLE_ZOOM as usize + 1];
    let mut z = 0;
    while z <= MAX_TABLE_ZOOM as usize {
        table[z] = (1u64 << z) as f64;
        z += 1;
    }
    table
};

/// Returns the number of tiles along one axis at zoom `z`.
///
/// Zoom levels 0..=24 come from a precomputed table; anything deeper is
/// computed directly.
#[inline]
pub fn world_size(z: u8) -> f64 {
    match WORLD_SIZE_TABLE.get(z as usize) {
        Some(size) => *size,
        None => 2.0_f64.powi(z as i32),
    }
}

/// Projects a longitude onto the normalized mercator x axis.
#[inline]
pub fn mercator_x_from_lng(lng: f64) -> f64 {
    (180.0 + lng) / 360.0
}

/// Projects a latitude onto the normalized mercator y axis (0 at north).
///
/// Latitudes beyond the Web Mercator limit are clamped.
#[inline]
pub fn mercator_y_from_lat(lat: f64) -> f64 {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    (180.0 - (180.0 / PI) * (PI / 4.0 + lat * PI / 360.0).tan().ln()) / 360.0
}

/// Validates that a tile address fits inside its zoom level's grid.
pub fn checked_tile_id(z: u8, x: u32, y: u32) -> Result<CanonicalTileId, CoordError> {
    if z > 31 {
        return Err(CoordError::InvalidZoom(z));
    }
    let dim = 1u64 << z;
    if u64::from(x) >= dim || u64::from(y) >= dim {
        return Err(CoordError::OutOfRange { z, x, y });
    }
    Ok(CanonicalTileId::new(z, x, y))
}

/// Converts a tile's north-west corner back to (longitude, latitude).
#[inline]
pub fn tile_to_lng_lat(tile: &CanonicalTileId) -> (f64, f64) {
    let n = world_size(tile.z);

    let lng = tile.x as f64 / n * 360.0 - 180.0;

    // Inverse Web Mercator
    let y = tile.y as f64 / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan() * 180.0 / PI;

    (lng, lat)
}
