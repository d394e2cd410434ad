use std::num::NonZeroU64;
use std::panic::catch_unwind;

use bytes::{Buf, Bytes};

use crate::{TilePackError, TilePackResult};

pub(crate) const MAX_INITIAL_BYTES: usize = 16_384;
pub(crate) const HEADER_SIZE: usize = 127;

/// The header of a `PMTiles` file, containing metadata about the tiles.
#[derive(Debug, Clone)]
pub struct Header {
    pub(crate) version: u8,
    pub(crate) root_offset: u64,
    pub(crate) root_length: u64,
    pub(crate) metadata_offset: u64,
    pub(crate) metadata_length: u64,
    pub(crate) leaf_offset: u64,
    pub(crate) leaf_length: u64,
    pub(crate) data_offset: u64,
    pub(crate) data_length: u64,
    pub(crate) n_addressed_tiles: Option<NonZeroU64>,
    pub(crate) n_tile_entries: Option<NonZeroU64>,
    pub(crate) n_tile_contents: Option<NonZeroU64>,
    pub(crate) clustered: bool,
    pub(crate) internal_compression: Compression,
    /// The compression used for tile data.
    pub tile_compression: Compression,
    /// The type of tiles.
    pub tile_type: TileType,
    /// The minimum zoom level.
    pub min_zoom: u8,
    /// The maximum zoom level.
    pub max_zoom: u8,
    /// The minimum longitude.
    pub min_longitude: f64,
    /// The minimum latitude.
    pub min_latitude: f64,
    /// The maximum longitude.
    pub max_longitude: f64,
    /// The maximum latitude.
    pub max_latitude: f64,
    /// The zoom level for the center point.
    pub center_zoom: u8,
    /// The longitude of the center point.
    pub center_longitude: f64,
    /// The latitude of the center point.
    pub center_latitude: f64,
}

impl Header {
    pub(crate) fn new(tile_compression: Compression, tile_type: TileType) -> Self {
        #[allow(clippy::excessive_precision)]
        Self {
            version: 3,
            root_offset: HEADER_SIZE as u64,
            root_length: 0,
            metadata_offset: MAX_INITIAL_BYTES as u64,
            metadata_length: 0,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 0,
            data_length: 0,
            n_addressed_tiles: None,
            n_tile_entries: None,
            n_tile_contents: None,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression,
            tile_type,
            min_zoom: 0,
            max_zoom: 22,
            min_longitude: -180.0,
            min_latitude: -85.051_129,
            max_longitude: 180.0,
            max_latitude: 85.051_129,
            center_zoom: 0,
            center_longitude: 0.0,
            center_latitude: 0.0,
        }
    }
}

/// Supported compression types for `PMTiles` data.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Compression {
    /// Unknown compression.
    Unknown,
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Brotli compression.
    Brotli,
    /// Zstandard compression.
    Zstd,
}

impl TryInto<Compression> for u8 {
    type Error = TilePackError;

    fn try_into(self) -> Result<Compression, Self::Error> {
        match self {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            _ => Err(TilePackError::InvalidCompression),
        }
    }
}

/// Supported tile types for `PMTiles`.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TileType {
    /// Unknown tile type.
    Unknown,
    /// Mapbox Vector Tile.
    Mvt,
    /// PNG image tile.
    Png,
    /// JPEG image tile.
    Jpeg,
    /// WebP image tile.
    Webp,
    /// AVIF image tile.
    Avif,
}

impl TileType {
    /// Maps an archive `format` metadata value to a tile type.
    #[must_use]
    pub fn from_format(format: &str) -> Self {
        match format {
            "pbf" | "mvt" => TileType::Mvt,
            "png" => TileType::Png,
            "jpg" | "jpeg" => TileType::Jpeg,
            "webp" => TileType::Webp,
            "avif" => TileType::Avif,
            _ => TileType::Unknown,
        }
    }
}

impl TryInto<TileType> for u8 {
    type Error = TilePackError;

    fn try_into(self) -> Result<TileType, Self::Error> {
        match self {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            _ => Err(TilePackError::InvalidTileType),
        }
    }
}

static V3_MAGIC: &str = "PMTiles";
static V2_MAGIC: &str = "PM";

impl Header {
    fn read_coordinate_part<B: Buf>(mut buf: B) -> f64 {
        f64::from(buf.get_i32_le()) / 10_000_000.
    }

    /// Attempts to parse a Header from a byte buffer.
    ///
    /// # Errors
    ///
    /// If the byte buffer contains invalid `PMTiles` header data.
    pub fn try_from_bytes(mut bytes: Bytes) -> TilePackResult<Self> {
        let magic_bytes = bytes.split_to(V3_MAGIC.len());

        // Assert magic
        if magic_bytes != V3_MAGIC {
            return Err(if magic_bytes.starts_with(V2_MAGIC.as_bytes()) {
                TilePackError::UnsupportedPmTilesVersion
            } else {
                TilePackError::InvalidMagicNumber
            });
        }

        // Wrap the panics that are possible in `get_u*_le` calls. (Panic occurs if the buffer is exhausted.)
        catch_unwind(move || {
            Ok(Self {
                version: bytes.get_u8(),
                root_offset: bytes.get_u64_le(),
                root_length: bytes.get_u64_le(),
                metadata_offset: bytes.get_u64_le(),
                metadata_length: bytes.get_u64_le(),
                leaf_offset: bytes.get_u64_le(),
                leaf_length: bytes.get_u64_le(),
                data_offset: bytes.get_u64_le(),
                data_length: bytes.get_u64_le(),
                n_addressed_tiles: NonZeroU64::new(bytes.get_u64_le()),
                n_tile_entries: NonZeroU64::new(bytes.get_u64_le()),
                n_tile_contents: NonZeroU64::new(bytes.get_u64_le()),
                clustered: bytes.get_u8() == 1,
                internal_compression: bytes.get_u8().try_into()?,
                tile_compression: bytes.get_u8().try_into()?,
                tile_type: bytes.get_u8().try_into()?,
                min_zoom: bytes.get_u8(),
                max_zoom: bytes.get_u8(),
                min_longitude: Self::read_coordinate_part(&mut bytes),
                min_latitude: Self::read_coordinate_part(&mut bytes),
                max_longitude: Self::read_coordinate_part(&mut bytes),
                max_latitude: Self::read_coordinate_part(&mut bytes),
                center_zoom: bytes.get_u8(),
                center_longitude: Self::read_coordinate_part(&mut bytes),
                center_latitude: Self::read_coordinate_part(&mut bytes),
            })
        })
        .map_err(|_| TilePackError::InvalidHeader)?
    }
}

impl crate::writer::pmtiles::WriteTo for Header {
    fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        use std::num::NonZero;

        // Write a magic number
        writer.write_all(V3_MAGIC.as_bytes())?;

        // Write header fields
        writer.write_all(&[self.version])?;
        writer.write_all(&self.root_offset.to_le_bytes())?;
        writer.write_all(&self.root_length.to_le_bytes())?;
        writer.write_all(&self.metadata_offset.to_le_bytes())?;
        writer.write_all(&self.metadata_length.to_le_bytes())?;
        writer.write_all(&self.leaf_offset.to_le_bytes())?;
        writer.write_all(&self.leaf_length.to_le_bytes())?;
        writer.write_all(&self.data_offset.to_le_bytes())?;
        writer.write_all(&self.data_length.to_le_bytes())?;
        writer.write_all(&self.n_addressed_tiles.map_or(0, NonZero::get).to_le_bytes())?;
        writer.write_all(&self.n_tile_entries.map_or(0, NonZero::get).to_le_bytes())?;
        writer.write_all(&self.n_tile_contents.map_or(0, NonZero::get).to_le_bytes())?;
        writer.write_all(&[u8::from(self.clustered)])?;
        writer.write_all(&[self.internal_compression as u8])?;
        writer.write_all(&[self.tile_compression as u8])?;
        writer.write_all(&[self.tile_type as u8])?;
        writer.write_all(&[self.min_zoom])?;
        writer.write_all(&[self.max_zoom])?;
        Self::write_coordinate_part(writer, self.min_longitude)?;
        Self::write_coordinate_part(writer, self.min_latitude)?;
        Self::write_coordinate_part(writer, self.max_longitude)?;
        Self::write_coordinate_part(writer, self.max_latitude)?;
        writer.write_all(&[self.center_zoom])?;
        Self::write_coordinate_part(writer, self.center_longitude)?;
        Self::write_coordinate_part(writer, self.center_latitude)?;

        Ok(())
    }
}

impl Header {
    #[allow(clippy::cast_possible_truncation)]
    fn write_coordinate_part<W: std::io::Write>(writer: &mut W, value: f64) -> std::io::Result<()> {
        writer.write_all(&((value * 10_000_000.0).round() as i32).to_le_bytes())
    }
}
