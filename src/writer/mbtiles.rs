use std::path::Path;

use rusqlite::{params, Connection};

use crate::bbox::LngLatBbox;
use crate::metadata::TilesetMetadata;
use crate::tile::Tile;
use crate::writer::TileWriter;
use crate::TilePackResult;

const SCHEMA: &str = "
    BEGIN TRANSACTION;
    CREATE TABLE IF NOT EXISTS map (
        zoom_level INTEGER NOT NULL,
        tile_column INTEGER NOT NULL,
        tile_row INTEGER NOT NULL,
        tile_id TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS map_index ON map (zoom_level, tile_column, tile_row);
    CREATE TABLE IF NOT EXISTS images (
        tile_data BLOB NOT NULL,
        tile_id TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS images_id ON images (tile_id);
    CREATE TABLE IF NOT EXISTS metadata (
        name TEXT,
        value TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS name ON metadata (name);
    CREATE VIEW IF NOT EXISTS tiles AS
    SELECT
        map.zoom_level AS zoom_level,
        map.tile_column AS tile_column,
        map.tile_row AS tile_row,
        images.tile_data AS tile_data
    FROM map
    JOIN images ON images.tile_id = map.tile_id;
    COMMIT;
    PRAGMA synchronous=OFF;
";

/// Content-deduplicated, batched MBTiles (SQLite) writer.
///
/// Payloads are keyed by their md5 in `images`; `map` holds one row per
/// coordinate with the TMS-inverted `tile_row`. Saves run inside a long-lived
/// transaction that is committed and reopened every `batch_size` tiles.
pub struct MbtilesWriter {
    conn: Connection,
    metadata: TilesetMetadata,
    batch_size: usize,
    batch_count: usize,
    has_tiles: bool,
    in_transaction: bool,
}

impl MbtilesWriter {
    /// Opens (or creates) the database at `dsn`.
    ///
    /// A `batch_size` of zero disables intermediate commits; everything is
    /// committed on close.
    pub fn new(
        dsn: impl AsRef<Path>,
        batch_size: usize,
        metadata: TilesetMetadata,
    ) -> TilePackResult<Self> {
        let conn = Connection::open(dsn)?;
        Ok(Self {
            conn,
            metadata,
            batch_size,
            batch_count: 0,
            has_tiles: false,
            in_transaction: false,
        })
    }

    fn begin(&mut self) -> TilePackResult<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN TRANSACTION;")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> TilePackResult<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT;")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

impl TileWriter for MbtilesWriter {
    fn create_tiles(&mut self) -> TilePackResult<()> {
        if self.has_tiles {
            return Ok(());
        }
        self.conn.execute_batch(SCHEMA)?;
        self.has_tiles = true;
        Ok(())
    }

    fn save(&mut self, tile: Tile, data: &[u8]) -> TilePackResult<()> {
        self.create_tiles()?;
        self.begin()?;

        let tile_id = format!("{:x}", md5::compute(data));
        let tile_row = tile.flipped_y();

        self.conn.execute(
            "INSERT OR REPLACE INTO images (tile_id, tile_data) VALUES (?1, ?2);",
            params![tile_id, data],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO map (zoom_level, tile_column, tile_row, tile_id) VALUES (?1, ?2, ?3, ?4);",
            params![tile.z, tile.x, tile_row, tile_id],
        )?;

        self.batch_count += 1;
        if self.batch_size > 0 && self.batch_count % self.batch_size == 0 {
            self.commit()?;
            self.batch_count = 0;
        }

        Ok(())
    }

    fn assign_spatial_metadata(
        &mut self,
        bounds: &LngLatBbox,
        min_zoom: u8,
        max_zoom: u8,
    ) -> TilePackResult<()> {
        // https://github.com/mapbox/mbtiles-spec/blob/master/1.3/spec.md
        let (center_lng, center_lat) = bounds.center();

        self.metadata.set(
            "bounds",
            format!(
                "{:.6},{:.6},{:.6},{:.6}",
                bounds.west, bounds.south, bounds.east, bounds.north
            ),
        );
        self.metadata
            .set("center", format!("{center_lng:.6},{center_lat:.6}"));
        self.metadata.set("minzoom", min_zoom.to_string());
        self.metadata.set("maxzoom", max_zoom.to_string());

        Ok(())
    }

    fn close(&mut self) -> TilePackResult<()> {
        self.begin()?;
        for (name, value) in self.metadata.iter() {
            self.conn.execute(
                "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2);",
                params![name, value],
            )?;
        }
        self.commit()
    }
}
