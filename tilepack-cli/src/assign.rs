//! Assign-metadata subcommand
//!
//! Scans an existing MBTiles archive, derives its geographic bounds and zoom
//! range from the stored tiles, and writes the spatial metadata back.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tilepack::{LngLatBbox, MbtilesReader, MbtilesWriter, Tile, TileWriter, TilesetMetadata};

#[derive(Parser, Debug)]
#[command(about = "Compute and store spatial metadata for existing MBTiles archives")]
pub struct Args {
    /// Verify that spatial metadata was written to each database
    #[arg(long)]
    verify: bool,

    /// MBTiles archives to update
    #[arg(value_name = "MBTILES", required = true)]
    paths: Vec<PathBuf>,
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    for path in &args.paths {
        let reader = MbtilesReader::open(path)
            .map_err(|err| format!("couldn't read input mbtiles {}: {err}", path.display()))?;

        let mut bounds: Option<LngLatBbox> = None;
        let mut min_zoom = u8::MAX;
        let mut max_zoom = 0u8;

        reader.visit_all_tiles(|tile, _data| {
            // Rows are stored TMS; flip back before computing geography.
            let tile = Tile::new(tile.z, tile.x, tile.flipped_y());
            let tile_bounds = tile.bounds();
            bounds = Some(match bounds {
                Some(current) => current.union(&tile_bounds),
                None => tile_bounds,
            });
            min_zoom = min_zoom.min(tile.z);
            max_zoom = max_zoom.max(tile.z);
        })?;
        drop(reader);

        let bounds =
            bounds.ok_or_else(|| format!("no tiles found in {}", path.display()))?;

        let mut writer = MbtilesWriter::new(path, 0, TilesetMetadata::new())?;
        writer.assign_spatial_metadata(&bounds, min_zoom, max_zoom)?;
        writer.close()?;

        if args.verify {
            let reader = MbtilesReader::open(path)?;
            let metadata = reader.metadata()?;
            let bounds = metadata.bounds()?;
            let (center_lng, center_lat) = metadata.center()?;
            log::info!(
                "[{}] bounds: {:?} center: ({center_lng}, {center_lat}) zoom: {}-{}",
                path.display(),
                bounds,
                metadata.min_zoom()?,
                metadata.max_zoom()?
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derives_bounds_and_zooms_from_stored_tiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mbtiles");

        {
            let mut metadata = TilesetMetadata::new();
            metadata.set("name", "t");
            metadata.set("format", "pbf");
            let mut writer = MbtilesWriter::new(&path, 50, metadata).unwrap();
            writer.save(Tile::new(2, 0, 0), b"a").unwrap();
            writer.save(Tile::new(3, 7, 7), b"b").unwrap();
            writer.close().unwrap();
        }

        run(Args {
            verify: true,
            paths: vec![path.clone()],
        })
        .unwrap();

        let reader = MbtilesReader::open(&path).unwrap();
        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.min_zoom().unwrap(), 2);
        assert_eq!(metadata.max_zoom().unwrap(), 3);

        let bounds = metadata.bounds().unwrap();
        // Tile (2, 0, 0) pins the west edge to -180.
        assert!((bounds.west - -180.0).abs() < 1e-6);
        assert!(bounds.east > bounds.west);
        assert!(bounds.north > bounds.south);
    }

    #[test]
    fn empty_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.mbtiles");

        {
            let writer = MbtilesWriter::new(&path, 50, TilesetMetadata::new());
            let mut writer = writer.unwrap();
            writer.create_tiles().unwrap();
            writer.close().unwrap();
        }

        let result = run(Args {
            verify: false,
            paths: vec![path],
        });
        assert!(result.is_err());
    }
}
