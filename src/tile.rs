use std::fmt::{Display, Formatter};

use crate::bbox::LngLatBbox;

/// Maximum zoom level supported by tile ids and enumeration.
pub const MAX_ZOOM: u8 = 30;

/// Latitude at which the Web Mercator projection clips to a square.
pub const WEB_MERCATOR_LAT_LIMIT: f64 = 85.051_128_779_806_59;

/// A slippy-map tile address in the XYZ convention (y = 0 at the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl Tile {
    #[must_use]
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Returns the tile containing the given lon/lat at zoom `z`.
    ///
    /// Latitudes beyond the Web Mercator limit are clamped first, so every
    /// input produces a valid tile address.
    #[must_use]
    pub fn at(lng: f64, lat: f64, z: u8) -> Self {
        let lat = lat.clamp(-WEB_MERCATOR_LAT_LIMIT, WEB_MERCATOR_LAT_LIMIT);
        let lat_rad = lat.to_radians();
        let n = f64::powi(2.0, i32::from(z));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let x = (((lng + 180.0) / 360.0 * n).floor() as u64).min(Self::side(z) - 1) as u32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let y = (((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
            * n)
            .floor() as u64)
            .min(Self::side(z) - 1) as u32;

        Self { z, x, y }
    }

    /// Number of tiles along one axis at this tile's zoom.
    fn side(z: u8) -> u64 {
        1u64 << z
    }

    /// The TMS row for this tile, `2^z - 1 - y`.
    #[must_use]
    pub fn flipped_y(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let last = (Self::side(self.z) - 1) as u32;
        last - self.y
    }

    /// The `PMTiles` v3 tile id: tiles of all lower zooms first, then the
    /// Hilbert-curve position of (x, y) within this zoom.
    #[must_use]
    pub fn tile_id(&self) -> u64 {
        if self.z == 0 {
            return 0;
        }

        let base_id: u64 = 1 + (1..self.z).map(|i| 4u64.pow(u32::from(i))).sum::<u64>();

        let curve_pos = hilbert_2d::u64::xy2h_discrete(
            u64::from(self.x),
            u64::from(self.y),
            self.z.into(),
            hilbert_2d::Variant::Hilbert,
        );

        base_id + curve_pos
    }

    /// The upper-left corner of this tile in decimal degrees.
    #[must_use]
    pub fn ul(&self) -> (f64, f64) {
        let n = f64::powi(2.0, i32::from(self.z));
        let lng = f64::from(self.x) / n * 360.0 - 180.0;
        let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * f64::from(self.y) / n))
            .sinh()
            .atan();
        (lng, lat_rad.to_degrees())
    }

    /// The geographic bounding box covered by this tile.
    #[must_use]
    pub fn bounds(&self) -> LngLatBbox {
        let (west, north) = self.ul();
        let shifted = Tile::new(self.z, self.x + 1, self.y + 1);
        let (east, south) = shifted.ul();
        LngLatBbox {
            west,
            south,
            east,
            north,
        }
    }

    /// The tile one zoom level up that contains this tile.
    #[must_use]
    pub fn parent(&self) -> Option<Tile> {
        if self.z == 0 {
            return None;
        }
        Some(Tile::new(self.z - 1, self.x / 2, self.y / 2))
    }

    /// The four tiles one zoom level down that this tile contains.
    #[must_use]
    pub fn children(&self) -> [Tile; 4] {
        let (z, x, y) = (self.z + 1, self.x * 2, self.y * 2);
        [
            Tile::new(z, x, y),
            Tile::new(z, x + 1, y),
            Tile::new(z, x + 1, y + 1),
            Tile::new(z, x, y + 1),
        ]
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_at_world_corners() {
        assert_eq!(Tile::at(-180.0, 85.0, 0), Tile::new(0, 0, 0));
        // The east/north edges stay in range even without the caller clamping.
        assert_eq!(Tile::at(180.0, -90.0, 2), Tile::new(2, 3, 3));
        assert_eq!(Tile::at(-180.0, 90.0, 2), Tile::new(2, 0, 0));
    }

    #[test]
    fn tile_at_known_locations() {
        // Greenwich, northern hemisphere: east half, upper half.
        let tile = Tile::at(0.1, 51.5, 4);
        assert_eq!(tile, Tile::new(4, 8, 5));
    }

    #[test]
    fn flipped_y_round_trips() {
        for z in 0..=8u8 {
            let side = 1u32 << z;
            for y in [0, side / 2, side - 1] {
                let tile = Tile::new(z, 0, y);
                let flipped = Tile::new(z, 0, tile.flipped_y());
                assert_eq!(flipped.flipped_y(), y);
            }
        }
    }

    #[test]
    fn tile_ids_match_pmtiles_layout() {
        assert_eq!(Tile::new(0, 0, 0).tile_id(), 0);
        assert_eq!(Tile::new(1, 1, 0).tile_id(), 4);
        assert_eq!(Tile::new(2, 1, 3).tile_id(), 11);
        assert_eq!(Tile::new(3, 3, 0).tile_id(), 26);
    }

    #[test]
    fn z0_bounds_cover_the_world() {
        let bounds = Tile::new(0, 0, 0).bounds();
        assert!((bounds.west - -180.0).abs() < 1e-9);
        assert!((bounds.east - 180.0).abs() < 1e-9);
        assert!((bounds.north - WEB_MERCATOR_LAT_LIMIT).abs() < 1e-9);
        assert!((bounds.south - -WEB_MERCATOR_LAT_LIMIT).abs() < 1e-9);
    }

    #[test]
    fn parent_and_children_invert() {
        let tile = Tile::new(5, 11, 19);
        for child in tile.children() {
            assert_eq!(child.parent(), Some(tile));
        }
        assert_eq!(Tile::new(0, 0, 0).parent(), None);
    }
}
