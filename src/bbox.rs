use crate::tile::{Tile, WEB_MERCATOR_LAT_LIMIT};

/// Nudge applied to the east clamp so `floor` never lands on column `2^z`.
const EAST_EDGE_NUDGE: f64 = 1e-8;

/// A geographic bounding box in decimal degrees.
///
/// `west > east` means the box crosses the antimeridian and is split at
/// ±180° before tile enumeration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLatBbox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBbox {
    #[must_use]
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns true if this box overlaps the other box.
    #[must_use]
    pub fn intersects(&self, other: &LngLatBbox) -> bool {
        let lat_overlaps = other.north > self.south && other.south < self.north;
        let lng_overlaps = other.east > self.west && other.west < self.east;
        lat_overlaps && lng_overlaps
    }

    /// The smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &LngLatBbox) -> Self {
        Self {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// The box midpoint as (lng, lat).
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.west, self.east),
            f64::midpoint(self.south, self.north),
        )
    }

    /// Splits at the antimeridian when `west > east`, otherwise returns the
    /// box unchanged.
    fn split(&self) -> Vec<LngLatBbox> {
        if self.west > self.east {
            vec![
                LngLatBbox::new(-180.0, self.south, self.east, self.north),
                LngLatBbox::new(self.west, self.south, 180.0, self.north),
            ]
        } else {
            vec![*self]
        }
    }

    fn clamped(&self) -> LngLatBbox {
        LngLatBbox {
            west: self.west.max(-180.0),
            south: self.south.max(-WEB_MERCATOR_LAT_LIMIT),
            east: self.east.min(180.0 - EAST_EDGE_NUDGE),
            north: self.north.min(WEB_MERCATOR_LAT_LIMIT),
        }
    }
}

/// An inclusive rectangle of tiles at a single zoom level.
///
/// `min.y` is the northern (smaller) row and `max.y` the southern one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min: Tile,
    pub max: Tile,
}

/// Emits one [`TileRange`] per (antimeridian-split box, zoom) pair.
pub fn generate_ranges(bounds: &LngLatBbox, zooms: &[u8], mut consume: impl FnMut(TileRange)) {
    for bbox in bounds.split() {
        let clamped = bbox.clamped();

        for &z in zooms {
            let ll = Tile::at(clamped.west, clamped.south, z);
            let ur = Tile::at(clamped.east, clamped.north, z);

            consume(TileRange {
                min: Tile::new(z, ll.x, ur.y),
                max: Tile::new(z, ur.x, ll.y),
            });
        }
    }
}

/// Emits every tile intersecting `bounds` at each of the given zooms.
///
/// With `inverted_y` the consumer receives the TMS row instead of the XYZ
/// row. An empty zoom list produces no output.
pub fn generate_tiles(
    bounds: &LngLatBbox,
    zooms: &[u8],
    inverted_y: bool,
    mut consume: impl FnMut(Tile),
) {
    generate_ranges(bounds, zooms, |range| {
        for x in range.min.x..=range.max.x {
            for y in range.min.y..=range.max.y {
                let tile = Tile::new(range.min.z, x, y);
                if inverted_y {
                    consume(Tile::new(tile.z, tile.x, tile.flipped_y()));
                } else {
                    consume(tile);
                }
            }
        }
    });
}

/// The number of tiles [`generate_tiles`] would emit for these bounds and
/// zooms, without enumerating them.
#[must_use]
pub fn count_tiles(bounds: &LngLatBbox, zooms: &[u8]) -> u64 {
    let mut total = 0u64;
    generate_ranges(bounds, zooms, |range| {
        let cols = u64::from(range.max.x - range.min.x) + 1;
        let rows = u64::from(range.max.y - range.min.y) + 1;
        total += cols * rows;
    });
    total
}
