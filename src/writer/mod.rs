mod disk;
mod mbtiles;
pub(crate) mod pmtiles;

pub use disk::DiskWriter;
pub use mbtiles::MbtilesWriter;
pub use pmtiles::PmtilesWriter;

use crate::bbox::LngLatBbox;
use crate::error::{TilePackError, TilePackResult};
use crate::metadata::TilesetMetadata;
use crate::tile::Tile;

/// A single-use archive writer.
///
/// Lifecycle: construct, [`create_tiles`](TileWriter::create_tiles) (idempotent
/// schema init), many [`save`](TileWriter::save) calls, optionally
/// [`assign_spatial_metadata`](TileWriter::assign_spatial_metadata), one
/// [`close`](TileWriter::close). Writers assume single-writer access; the
/// pipeline funnels all saves through one consumer task.
pub trait TileWriter: Send {
    /// Prepares the archive to receive tiles. Safe to call more than once.
    fn create_tiles(&mut self) -> TilePackResult<()>;

    /// Stores one tile payload.
    fn save(&mut self, tile: Tile, data: &[u8]) -> TilePackResult<()>;

    /// Records bounds, center, and the zoom range. Repeated calls keep the
    /// last-written values; they are flushed on close.
    fn assign_spatial_metadata(
        &mut self,
        bounds: &LngLatBbox,
        min_zoom: u8,
        max_zoom: u8,
    ) -> TilePackResult<()>;

    /// Finalizes the archive. After a successful close it is readable by the
    /// corresponding reader.
    fn close(&mut self) -> TilePackResult<()>;
}

/// Constructs a writer for the given output mode (`disk`, `mbtiles`, or
/// `pmtiles`).
///
/// For `disk` the DSN is the root directory and the payload extension comes
/// from the metadata `format` entry.
pub fn create_writer(
    mode: &str,
    dsn: &str,
    batch_size: usize,
    metadata: TilesetMetadata,
) -> TilePackResult<Box<dyn TileWriter + Send>> {
    match mode {
        "disk" => {
            let format = metadata.format().unwrap_or("png").to_string();
            Ok(Box::new(DiskWriter::new(dsn, format)?))
        }
        "mbtiles" => Ok(Box::new(MbtilesWriter::new(dsn, batch_size, metadata)?)),
        "pmtiles" => Ok(Box::new(PmtilesWriter::new(dsn, metadata)?)),
        other => Err(TilePackError::UnknownOutputMode(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_is_rejected() {
        let result = create_writer("carrier-pigeon", "/tmp/out", 50, TilesetMetadata::new());
        assert!(matches!(
            result.err(),
            Some(TilePackError::UnknownOutputMode(_))
        ));
    }
}
