//! Build subcommand
//!
//! Enumerates every tile in the bounding box at the requested zooms, fetches
//! them on a worker pool, and packs the chosen archive.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tilepack::{
    count_tiles, create_writer, pipeline, LngLatBbox, PipelineOptions, TilesetMetadata,
    XyzJobGenerator,
};

#[derive(Parser, Debug)]
#[command(about = "Fetch every tile in a bounding box and pack an archive")]
pub struct Args {
    /// URL template with {z}, {x}, and {y} tokens. A file:// template reads
    /// tiles from --file-transport-root instead of the network.
    #[arg(long = "url-template")]
    url_template: String,

    /// Root directory for tiles when --url-template uses file://
    #[arg(long = "file-transport-root")]
    file_transport_root: Option<PathBuf>,

    /// Archive kind to produce: disk, mbtiles, or pmtiles
    #[arg(long = "output-mode", default_value = "mbtiles")]
    output_mode: String,

    /// Path of the archive (or root directory for disk output)
    #[arg(long)]
    dsn: String,

    /// Comma-separated bounding box in south,west,north,east order
    #[arg(long, default_value = "-90.0,-180.0,90.0,180.0")]
    bounds: String,

    /// Comma-separated zoom levels or a MIN-MAX range
    #[arg(long, default_value = "0-10")]
    zooms: String,

    /// Number of tile fetch workers
    #[arg(long, default_value_t = 25)]
    workers: usize,

    /// Tiles per transaction for the mbtiles writer
    #[arg(long = "batch-size", default_value_t = 50)]
    batch_size: usize,

    /// Tileset name written to the archive metadata
    #[arg(long = "tileset-name", default_value = "tileset")]
    tileset_name: String,

    /// Tile format written to the archive metadata
    #[arg(long = "output-format", default_value = "pbf")]
    output_format: String,

    /// HTTP client timeout per tile request, in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Request TMS (inverted-y) tile coordinates from the source
    #[arg(long = "inverted-y")]
    inverted_y: bool,

    /// Gzip tile payloads that do not arrive gzip-encoded
    #[arg(long = "ensure-gzip", default_value_t = true, action = clap::ArgAction::Set)]
    ensure_gzip: bool,
}

fn parse_bounds(raw: &str) -> Result<LngLatBbox, Box<dyn Error>> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("bounding box could not be parsed as numbers: {raw}"))?;

    if parts.len() != 4 {
        return Err("bounding box must be a comma-separated list of 4 numbers".into());
    }

    // south,west,north,east on the command line
    Ok(LngLatBbox::new(parts[1], parts[0], parts[3], parts[2]))
}

fn parse_zooms(raw: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    if let Some((min, max)) = raw.split_once('-') {
        if let (Ok(min), Ok(max)) = (min.trim().parse::<u8>(), max.trim().parse::<u8>()) {
            if min > max {
                return Err("invalid zoom range".into());
            }
            return Ok((min..=max).collect());
        }
    }

    raw.split(',')
        .map(|zoom| zoom.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("zoom list could not be parsed: {err}").into())
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let bounds = parse_bounds(&args.bounds)?;
    let zooms = parse_zooms(&args.zooms)?;
    let timeout = Duration::from_secs(args.timeout);

    let generator = if args.url_template.starts_with("file://") {
        let root = args.file_transport_root.as_ref().ok_or(
            "--file-transport-root is required when the URL template uses file://",
        )?;
        XyzJobGenerator::with_file_transport(
            root,
            &args.url_template,
            bounds,
            zooms.clone(),
            timeout,
            args.inverted_y,
            args.ensure_gzip,
        )?
    } else {
        XyzJobGenerator::new(
            &args.url_template,
            bounds,
            zooms.clone(),
            timeout,
            args.inverted_y,
            args.ensure_gzip,
        )?
    };

    if args.output_format != "pbf" && args.ensure_gzip {
        log::warn!(
            "gzipping is only required for PBF tiles; consider --ensure-gzip false for {} output",
            args.output_format
        );
    }

    let mut metadata = TilesetMetadata::new();
    metadata.set("name", &args.tileset_name);
    metadata.set("format", &args.output_format);

    let writer = create_writer(&args.output_mode, &args.dsn, args.batch_size, metadata)?;
    log::info!("created {} output", args.output_mode);

    let expected = count_tiles(&bounds, &zooms);
    log::info!("expecting to fetch {expected} tiles");

    let bar = ProgressBar::new(expected);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {per_sec}",
        )?
        .progress_chars("=>-"),
    );

    let bar_handle = bar.clone();
    let options = PipelineOptions {
        workers: args.workers,
        progress: Some(Arc::new(move |saved| bar_handle.set_position(saved))),
    };

    let summary = pipeline::run(&generator, writer, bounds, &zooms, options).await?;
    bar.finish();
    log::info!("processed {} tiles", summary.saved);

    Ok(())
}
