//! Merge subcommand
//!
//! Unions several MBTiles archives into one deduplicated output.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tilepack::{LngLatBbox, MbtilesReader, MbtilesWriter, Tile, TileWriter, TilesetMetadata};

#[derive(Parser, Debug)]
#[command(about = "Union several MBTiles archives into one")]
pub struct Args {
    /// The output mbtiles to write to
    #[arg(long)]
    output: PathBuf,

    /// Input mbtiles archives
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    // Never clobber an existing archive.
    if args.output.exists() {
        return Err(format!(
            "output path {} already exists and cannot be overwritten",
            args.output.display()
        )
        .into());
    }

    log::info!(
        "reading {} inputs and writing them to {}",
        args.inputs.len(),
        args.output.display()
    );

    let mut output_bounds: Option<LngLatBbox> = None;
    let mut output_min_zoom = u8::MAX;
    let mut output_max_zoom = 0u8;
    let mut output_format: Option<String> = None;
    let mut tileset_names: Vec<String> = Vec::new();
    let mut readers = Vec::new();

    for input in &args.inputs {
        let reader = MbtilesReader::open(input)
            .map_err(|err| format!("couldn't read input mbtiles {}: {err}", input.display()))?;
        let metadata = reader.metadata()?;

        let format = metadata.format()?.to_string();
        match &output_format {
            None => output_format = Some(format),
            Some(consensus) if *consensus != format => {
                return Err(format!(
                    "input {} has format {format}, but consensus output format is {consensus}",
                    input.display()
                )
                .into());
            }
            Some(_) => {}
        }

        tileset_names.push(metadata.name()?.to_string());

        let bounds = metadata.bounds()?;
        output_bounds = Some(match output_bounds {
            Some(current) => current.union(&bounds),
            None => bounds,
        });
        output_min_zoom = output_min_zoom.min(metadata.min_zoom()?);
        output_max_zoom = output_max_zoom.max(metadata.max_zoom()?);

        readers.push(reader);
    }

    let mut metadata = TilesetMetadata::new();
    metadata.set("name", tileset_names.join(","));
    metadata.set("format", output_format.unwrap_or_default());

    let mut writer = MbtilesWriter::new(&args.output, 1000, metadata)?;
    writer.create_tiles()?;

    for (reader, input) in readers.iter().zip(&args.inputs) {
        reader.visit_all_tiles(|tile, data| {
            // Stored rows are TMS; flip back to XYZ before re-saving so the
            // writer's own inversion lands on the original row.
            let tile = Tile::new(tile.z, tile.x, tile.flipped_y());
            if let Err(err) = writer.save(tile, data) {
                log::warn!("couldn't save tile {tile} from {}: {err}", input.display());
            }
        })?;
    }
    drop(readers);

    if let Some(bounds) = output_bounds {
        if let Err(err) =
            writer.assign_spatial_metadata(&bounds, output_min_zoom, output_max_zoom)
        {
            log::warn!("wrote tiles but failed to assign spatial metadata: {err}");
        }
    }

    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_input(path: &std::path::Path, name: &str, tiles: &[(Tile, &[u8])]) {
        let mut metadata = TilesetMetadata::new();
        metadata.set("name", name);
        metadata.set("format", "pbf");
        let mut writer = MbtilesWriter::new(path, 50, metadata).unwrap();
        for (tile, data) in tiles {
            writer.save(*tile, data).unwrap();
        }
        writer
            .assign_spatial_metadata(&LngLatBbox::new(-10.0, -10.0, 10.0, 10.0), 1, 1)
            .unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn merged_archive_unions_tiles_and_names() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mbtiles");
        let b = dir.path().join("b.mbtiles");
        let out = dir.path().join("out.mbtiles");

        build_input(&a, "alpha", &[(Tile::new(1, 0, 0), b"one")]);
        build_input(&b, "beta", &[(Tile::new(1, 1, 1), b"two")]);

        let args = Args {
            output: out.clone(),
            inputs: vec![a, b],
        };
        run(args).unwrap();

        let reader = MbtilesReader::open(&out).unwrap();
        let mut count = 0;
        reader.visit_all_tiles(|_, _| count += 1).unwrap();
        assert_eq!(count, 2);

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.name().unwrap(), "alpha,beta");

        // Row values survive the round trip unchanged.
        let hit = reader.get_tile(Tile::new(1, 0, 1)).unwrap();
        assert_eq!(hit.data.as_deref(), Some(b"one".as_slice()));
    }

    #[test]
    fn existing_output_is_refused() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("exists.mbtiles");
        std::fs::write(&out, b"occupied").unwrap();

        let args = Args {
            output: out,
            inputs: vec![dir.path().join("missing.mbtiles")],
        };
        assert!(run(args).is_err());
    }

    #[test]
    fn format_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mbtiles");
        let b = dir.path().join("b.mbtiles");

        build_input(&a, "alpha", &[(Tile::new(0, 0, 0), b"one")]);
        {
            let mut metadata = TilesetMetadata::new();
            metadata.set("name", "beta");
            metadata.set("format", "png");
            let mut writer = MbtilesWriter::new(&b, 50, metadata).unwrap();
            writer.save(Tile::new(0, 0, 0), b"two").unwrap();
            writer
                .assign_spatial_metadata(&LngLatBbox::new(-1.0, -1.0, 1.0, 1.0), 0, 0)
                .unwrap();
            writer.close().unwrap();
        }

        let args = Args {
            output: dir.path().join("out.mbtiles"),
            inputs: vec![a, b],
        };
        assert!(run(args).is_err());
    }
}
