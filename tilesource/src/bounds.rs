//! Spatial bounds filter for archive tiles.
//!
//! [`TileBounds`] projects an archive's declared longitude/latitude bounds into
//! normalized Web Mercator space once, so the per-tile containment test is
//! plain multiplication and rounding.
//!
//! Bounds that cross the antimeridian (`west > east`) are not special-cased;
//! such an archive yields an empty x range and every tile is rejected.

use crate::coord::{mercator_x_from_lng, mercator_y_from_lat, world_size, CanonicalTileId};

/// Longitude/latitude rectangle as declared by an archive header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    /// Creates bounds from `[west, south, east, north]` in degrees.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns the bounds as `[west, south, east, north]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

/// Precomputed containment test for an archive's spatial extent.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBounds {
    bounds: LngLatBounds,
    min_zoom: u8,
    max_zoom: u8,
    // Normalized mercator coordinates; y grows southward.
    west_x: f64,
    east_x: f64,
    north_y: f64,
    south_y: f64,
}

impl TileBounds {
    /// Builds the filter from lon/lat bounds and the archive's zoom range.
    pub fn new(bounds: LngLatBounds, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            west_x: mercator_x_from_lng(bounds.west),
            east_x: mercator_x_from_lng(bounds.east),
            north_y: mercator_y_from_lat(bounds.north),
            south_y: mercator_y_from_lat(bounds.south),
            bounds,
            min_zoom,
            max_zoom,
        }
    }

    /// The declared lon/lat bounds.
    pub fn bounds(&self) -> &LngLatBounds {
        &self.bounds
    }

    /// Minimum zoom declared by the archive.
    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    /// Maximum zoom declared by the archive.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Returns true if `tile` intersects the declared bounds.
    ///
    /// West and north edges are floored, east and south edges are ceiled, so a
    /// tile that only partly overlaps the bounds is still requested.
    pub fn contains(&self, tile: &CanonicalTileId) -> bool {
        let size = world_size(tile.z);

        let min_x = (self.west_x * size).floor();
        let max_x = (self.east_x * size).ceil();
        let min_y = (self.north_y * size).floor();
        let max_y = (self.south_y * size).ceil();

        let x = tile.x as f64;
        let y = tile.y as f64;
        x >= min_x && x < max_x && y >= min_y && y < max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_degree_box() -> TileBounds {
        TileBounds::new(LngLatBounds::new(-10.0, -10.0, 10.0, 10.0), 0, 14)
    }

    #[test]
    fn test_z0_single_tile_inside() {
        // At zoom 0 the one world tile always intersects non-empty bounds
        let bounds = TileBounds::new(LngLatBounds::new(5.0, 5.0, 6.0, 6.0), 0, 14);
        assert!(bounds.contains(&CanonicalTileId::new(0, 0, 0)));
    }

    #[test]
    fn test_z1_straddling_bounds_hit_all_four_quadrants() {
        let bounds = ten_degree_box();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert!(
                bounds.contains(&CanonicalTileId::new(1, x, y)),
                "tile 1/{}/{} should intersect",
                x,
                y
            );
        }
    }

    #[test]
    fn test_z1_bounds_in_one_quadrant() {
        // North-east quadrant only
        let bounds = TileBounds::new(LngLatBounds::new(20.0, 20.0, 40.0, 40.0), 0, 14);
        assert!(bounds.contains(&CanonicalTileId::new(1, 1, 0)));
        assert!(!bounds.contains(&CanonicalTileId::new(1, 0, 0)));
        assert!(!bounds.contains(&CanonicalTileId::new(1, 1, 1)));
        assert!(!bounds.contains(&CanonicalTileId::new(1, 0, 1)));
    }

    #[test]
    fn test_z14_inside_and_outside() {
        let bounds = ten_degree_box();
        // Tile at the equator / prime meridian
        assert!(bounds.contains(&CanonicalTileId::new(14, 8192, 8192)));
        // Far east, outside of the box
        assert!(!bounds.contains(&CanonicalTileId::new(14, 12000, 8192)));
        // Far north, outside of the box
        assert!(!bounds.contains(&CanonicalTileId::new(14, 8192, 4000)));
    }

    #[test]
    fn test_z14_edge_tiles() {
        let bounds = ten_degree_box();
        let size = world_size(14);
        let west_edge = (mercator_x_from_lng(-10.0) * size).floor() as u32;
        let east_edge = (mercator_x_from_lng(10.0) * size).ceil() as u32;

        // Straddling the west boundary is inside, one tile further is outside
        assert!(bounds.contains(&CanonicalTileId::new(14, west_edge, 8192)));
        assert!(!bounds.contains(&CanonicalTileId::new(14, west_edge - 1, 8192)));
        // The east edge is exclusive
        assert!(bounds.contains(&CanonicalTileId::new(14, east_edge - 1, 8192)));
        assert!(!bounds.contains(&CanonicalTileId::new(14, east_edge, 8192)));
    }

    #[test]
    fn test_antimeridian_crossing_rejects_everything() {
        let bounds = TileBounds::new(LngLatBounds::new(170.0, -10.0, -170.0, 10.0), 0, 10);
        assert!(!bounds.contains(&CanonicalTileId::new(2, 0, 1)));
        assert!(!bounds.contains(&CanonicalTileId::new(2, 3, 1)));
    }

    #[test]
    fn test_accessors() {
        let bounds = ten_degree_box();
        assert_eq!(bounds.min_zoom(), 0);
        assert_eq!(bounds.max_zoom(), 14);
        assert_eq!(bounds.bounds().to_array(), [-10.0, -10.0, 10.0, 10.0]);
    }
}
