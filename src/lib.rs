//! Bulk-harvest map tiles from remote XYZ sources and pack them into
//! single-file archives (MBTiles or `PMTiles` v3) for offline serving.
//!
//! The crate is three cooperating pieces: tile enumeration over a geographic
//! bounding box ([`generate_tiles`], [`count_tiles`]), a bounded
//! producer/consumer fetch pipeline ([`pipeline::run`]), and the archive
//! writers behind the [`TileWriter`] trait.

mod bbox;
mod directory;
mod error;
pub mod fetch;
mod header;
mod metadata;
pub mod pipeline;
mod reader;
mod tile;
mod writer;

pub use bbox::{count_tiles, generate_ranges, generate_tiles, LngLatBbox, TileRange};
pub use directory::{DirEntry, Directory};
pub use error::{TilePackError, TilePackResult};
pub use fetch::{
    render_url, JobGenerator, TileRequest, TileResponse, TileWorker, XyzJobGenerator,
};
pub use header::{Compression, Header, TileType};
pub use metadata::TilesetMetadata;
pub use pipeline::{PipelineOptions, PipelineSummary, ProgressFn};
pub use reader::{MbtilesReader, TileData};
pub use tile::{Tile, MAX_ZOOM, WEB_MERCATOR_LAT_LIMIT};
pub use writer::{create_writer, DiskWriter, MbtilesWriter, PmtilesWriter, TileWriter};
