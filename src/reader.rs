use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::metadata::TilesetMetadata;
use crate::tile::Tile;
use crate::TilePackResult;

/// A tile read back from an archive. `data` is `None` for coordinates the
/// archive does not contain.
#[derive(Debug, Clone)]
pub struct TileData {
    pub tile: Tile,
    pub data: Option<Vec<u8>>,
}

/// Read-only access to an MBTiles archive.
pub struct MbtilesReader {
    conn: Connection,
}

impl MbtilesReader {
    /// Opens the database at `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> TilePackResult<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Returns the payload stored for the given coordinates.
    ///
    /// The lookup uses the row values as stored, so `tile.y` is the TMS row.
    /// A missing tile is not an error; it comes back with `data: None`.
    pub fn get_tile(&self, tile: Tile) -> TilePackResult<TileData> {
        let data = self
            .conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level=?1 AND tile_column=?2 AND tile_row=?3 LIMIT 1",
                params![tile.z, tile.x, tile.y],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;

        Ok(TileData { tile, data })
    }

    /// Streams every stored tile to the visitor, with `y` as the raw TMS row.
    pub fn visit_all_tiles(
        &self,
        mut visitor: impl FnMut(Tile, &[u8]),
    ) -> TilePackResult<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let parsed: rusqlite::Result<(u8, u32, u32, Vec<u8>)> =
                (|| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))();
            match parsed {
                Ok((z, x, y, data)) => visitor(Tile::new(z, x, y), &data),
                Err(err) => log::warn!("couldn't scan tile row: {err}"),
            }
        }

        Ok(())
    }

    /// Returns the archive's metadata table as a map.
    pub fn metadata(&self) -> TilePackResult<TilesetMetadata> {
        let mut stmt = self.conn.prepare("SELECT name, value FROM metadata")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut metadata = TilesetMetadata::new();
        for row in rows {
            let (name, value) = row?;
            metadata.set(name, value);
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::LngLatBbox;
    use crate::metadata::TilesetMetadata;
    use crate::writer::{MbtilesWriter, TileWriter};
    use tempfile::TempDir;

    fn build_archive(path: &Path) {
        let mut metadata = TilesetMetadata::new();
        metadata.set("name", "roundtrip");
        metadata.set("format", "pbf");
        let mut writer = MbtilesWriter::new(path, 50, metadata).unwrap();
        writer.save(Tile::new(1, 0, 0), b"northwest").unwrap();
        writer.save(Tile::new(1, 1, 1), b"southeast").unwrap();
        writer
            .assign_spatial_metadata(&LngLatBbox::new(-180.0, -85.0, 180.0, 85.0), 1, 1)
            .unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn get_tile_uses_stored_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mbtiles");
        build_archive(&path);

        let reader = MbtilesReader::open(&path).unwrap();
        // (z=1, x=0, y=0) was stored with tile_row = 1.
        let hit = reader.get_tile(Tile::new(1, 0, 1)).unwrap();
        assert_eq!(hit.data.as_deref(), Some(b"northwest".as_slice()));

        // (z=1, x=1, y=1) was stored with tile_row = 0.
        let other = reader.get_tile(Tile::new(1, 1, 0)).unwrap();
        assert_eq!(other.data.as_deref(), Some(b"southeast".as_slice()));
    }

    #[test]
    fn missing_tile_is_a_tombstone_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mbtiles");
        build_archive(&path);

        let reader = MbtilesReader::open(&path).unwrap();
        let tombstone = reader.get_tile(Tile::new(4, 9, 9)).unwrap();
        assert!(tombstone.data.is_none());
        assert_eq!(tombstone.tile, Tile::new(4, 9, 9));
    }

    #[test]
    fn visit_all_tiles_sees_every_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mbtiles");
        build_archive(&path);

        let reader = MbtilesReader::open(&path).unwrap();
        let mut seen = Vec::new();
        reader
            .visit_all_tiles(|tile, data| seen.push((tile, data.to_vec())))
            .unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn metadata_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mbtiles");
        build_archive(&path);

        let reader = MbtilesReader::open(&path).unwrap();
        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.name().unwrap(), "roundtrip");
        assert_eq!(metadata.format().unwrap(), "pbf");
        assert_eq!(metadata.min_zoom().unwrap(), 1);
        let bounds = metadata.bounds().unwrap();
        assert!((bounds.west - -180.0).abs() < 1e-6);
    }
}
