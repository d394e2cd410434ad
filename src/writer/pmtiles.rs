use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::num::NonZeroU64;
use std::path::Path;

use flate2::write::GzEncoder;
use roaring::RoaringTreemap;

use crate::bbox::LngLatBbox;
use crate::directory::{DirEntry, Directory};
use crate::header::{Compression, Header, TileType, HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::metadata::TilesetMetadata;
use crate::tile::Tile;
use crate::writer::TileWriter;
use crate::{TilePackError, TilePackResult};

/// First two bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// FNV-1a 128 offset basis and prime, per the FNV reference parameters.
const FNV128_OFFSET_BASIS: u128 = 0x6c62_272e_07bb_0142_62b8_2175_6295_c592;
const FNV128_PRIME: u128 = 0x0000_0000_0100_0000_0000_0000_0000_013b;

pub(crate) fn fnv1a_128(data: &[u8]) -> u128 {
    let mut hash = FNV128_OFFSET_BASIS;
    for &byte in data {
        hash ^= u128::from(byte);
        hash = hash.wrapping_mul(FNV128_PRIME);
    }
    hash
}

pub(crate) trait WriteTo {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;

    fn write_compressed_to<W: Write>(
        &self,
        writer: &mut W,
        compression: Compression,
    ) -> TilePackResult<()> {
        match compression {
            Compression::None => self.write_to(writer)?,
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(writer, flate2::Compression::default());
                self.write_to(&mut encoder)?;
                encoder.finish()?;
            }
            _ => return Err(TilePackError::InvalidCompression),
        }
        Ok(())
    }

    fn compressed_vec(&self, compression: Compression) -> TilePackResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_compressed_to(&mut buf, compression)?;
        Ok(buf)
    }
}

impl WriteTo for [u8] {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self)
    }
}

/// Streaming content-addressed `PMTiles` v3 writer.
///
/// Payloads are appended to a scratch file as they arrive (gzip-compressed
/// unless already gzipped), deduplicated by FNV-1a 128 content hash. On close
/// the directory hierarchy is optimized and the final file is assembled as
/// header, root directory, metadata, leaf directories, tile data.
pub struct PmtilesWriter {
    out: File,
    scratch: File,
    seen: RoaringTreemap,
    offsets: HashMap<u128, (u64, u32)>,
    entries: Vec<DirEntry>,
    compress_buf: Vec<u8>,
    metadata: TilesetMetadata,
    header: Header,
}

impl PmtilesWriter {
    /// Creates the output file at `dsn` and an anonymous scratch file for
    /// the tile-data region.
    pub fn new(dsn: impl AsRef<Path>, metadata: TilesetMetadata) -> TilePackResult<Self> {
        let out = File::create(dsn)?;
        let scratch = tempfile::tempfile()?;

        let tile_type = metadata
            .format()
            .map(TileType::from_format)
            .unwrap_or(TileType::Unknown);

        Ok(Self {
            out,
            scratch,
            seen: RoaringTreemap::new(),
            offsets: HashMap::new(),
            entries: Vec::new(),
            compress_buf: Vec::new(),
            metadata,
            header: Header::new(Compression::Gzip, tile_type),
        })
    }
}

impl TileWriter for PmtilesWriter {
    fn create_tiles(&mut self) -> TilePackResult<()> {
        Ok(())
    }

    fn save(&mut self, tile: Tile, data: &[u8]) -> TilePackResult<()> {
        // PMTiles ids are the Hilbert index over the TMS row.
        let flipped = Tile::new(tile.z, tile.x, tile.flipped_y());
        let id = flipped.tile_id();
        self.seen.insert(id);

        let hash = fnv1a_128(data);
        let (offset, length) = match self.offsets.get(&hash) {
            Some(&found) => found,
            None => {
                let offset = self.scratch.seek(SeekFrom::End(0))?;

                let stored: &[u8] = if data.starts_with(&GZIP_MAGIC) {
                    data
                } else {
                    self.compress_buf.clear();
                    let mut encoder =
                        GzEncoder::new(&mut self.compress_buf, flate2::Compression::default());
                    encoder.write_all(data)?;
                    encoder.finish()?;
                    &self.compress_buf
                };

                self.scratch.write_all(stored)?;
                let length =
                    u32::try_from(stored.len()).map_err(|_| TilePackError::IndexEntryOverflow)?;
                self.offsets.insert(hash, (offset, length));
                (offset, length)
            }
        };

        self.entries.push(DirEntry {
            tile_id: id,
            offset,
            length,
            run_length: 1,
        });

        Ok(())
    }

    fn assign_spatial_metadata(
        &mut self,
        bounds: &LngLatBbox,
        min_zoom: u8,
        max_zoom: u8,
    ) -> TilePackResult<()> {
        let (center_lng, center_lat) = bounds.center();
        self.header.min_longitude = bounds.west;
        self.header.min_latitude = bounds.south;
        self.header.max_longitude = bounds.east;
        self.header.max_latitude = bounds.north;
        self.header.center_longitude = center_lng;
        self.header.center_latitude = center_lat;
        self.header.min_zoom = min_zoom;
        self.header.max_zoom = max_zoom;
        self.header.center_zoom = min_zoom;
        Ok(())
    }

    fn close(&mut self) -> TilePackResult<()> {
        log::info!("writing {} tiles to pmtiles", self.seen.len());

        self.header.n_addressed_tiles = NonZeroU64::new(self.seen.len());
        self.header.n_tile_entries = NonZeroU64::new(self.entries.len() as u64);
        self.header.n_tile_contents = NonZeroU64::new(self.offsets.len() as u64);
        // The data region is in arrival order, not id order.
        self.header.clustered = false;

        // Directories must be ordered by tile id even though entries arrive
        // in save order; readers binary-search them.
        self.entries.sort_by_key(|entry| entry.tile_id);

        let compression = Compression::Gzip;
        let (root_bytes, leaves_bytes, num_leaves) =
            optimize_directories(&self.entries, MAX_INITIAL_BYTES - HEADER_SIZE, compression)?;

        if num_leaves > 0 {
            log::debug!(
                "directories: {} root bytes, {} leaf bytes in {} leaves",
                root_bytes.len(),
                leaves_bytes.len(),
                num_leaves
            );
        } else {
            log::debug!("directories: {} root bytes, no leaves", root_bytes.len());
        }

        let metadata_bytes = serialize_metadata(&self.metadata, compression)?;

        let data_length = self.scratch.seek(SeekFrom::End(0))?;

        self.header.internal_compression = compression;
        self.header.root_offset = HEADER_SIZE as u64;
        self.header.root_length = root_bytes.len() as u64;
        self.header.metadata_offset = self.header.root_offset + self.header.root_length;
        self.header.metadata_length = metadata_bytes.len() as u64;
        self.header.leaf_offset = self.header.metadata_offset + self.header.metadata_length;
        self.header.leaf_length = leaves_bytes.len() as u64;
        self.header.data_offset = self.header.leaf_offset + self.header.leaf_length;
        self.header.data_length = data_length;

        let mut out = BufWriter::new(&mut self.out);
        self.header.write_to(&mut out)?;
        out.write_all(&root_bytes)?;
        out.write_all(&metadata_bytes)?;
        out.write_all(&leaves_bytes)?;

        self.scratch.seek(SeekFrom::Start(0))?;
        std::io::copy(&mut self.scratch, &mut out)?;
        out.flush()?;

        Ok(())
    }
}

fn serialize_entries(entries: &[DirEntry], compression: Compression) -> TilePackResult<Vec<u8>> {
    Directory::from_entries(entries.to_vec()).compressed_vec(compression)
}

/// Builds the root directory and, if necessary, a leaf directory blob.
///
/// Case 1 emits every entry in the root when the serialized form fits within
/// `target_root_len`. Otherwise entries are chunked into leaves, growing the
/// chunk size by 20% per attempt until the leaf-pointer root fits.
fn optimize_directories(
    entries: &[DirEntry],
    target_root_len: usize,
    compression: Compression,
) -> TilePackResult<(Vec<u8>, Vec<u8>, usize)> {
    if entries.len() < 16384 {
        let root_bytes = serialize_entries(entries, compression)?;
        if root_bytes.len() <= target_root_len {
            return Ok((root_bytes, Vec::new(), 0));
        }
    }

    let mut leaf_size = (entries.len() / 3500).max(4096);
    loop {
        let (root_bytes, leaves_bytes, num_leaves) =
            build_roots_leaves(entries, leaf_size, compression)?;
        if root_bytes.len() <= target_root_len {
            return Ok((root_bytes, leaves_bytes, num_leaves));
        }
        leaf_size += leaf_size / 5;
    }
}

fn build_roots_leaves(
    entries: &[DirEntry],
    leaf_size: usize,
    compression: Compression,
) -> TilePackResult<(Vec<u8>, Vec<u8>, usize)> {
    let mut root_entries = Vec::new();
    let mut leaves_bytes = Vec::new();
    let mut num_leaves = 0;

    for chunk in entries.chunks(leaf_size) {
        num_leaves += 1;
        let serialized = serialize_entries(chunk, compression)?;
        root_entries.push(DirEntry {
            tile_id: chunk[0].tile_id,
            offset: leaves_bytes.len() as u64,
            length: u32::try_from(serialized.len())
                .map_err(|_| TilePackError::IndexEntryOverflow)?,
            run_length: 0,
        });
        leaves_bytes.extend_from_slice(&serialized);
    }

    let root_bytes = serialize_entries(&root_entries, compression)?;
    Ok((root_bytes, leaves_bytes, num_leaves))
}

fn serialize_metadata(
    metadata: &TilesetMetadata,
    compression: Compression,
) -> TilePackResult<Vec<u8>> {
    let mut object = serde_json::Map::new();
    for (key, value) in metadata.iter() {
        object.insert(
            key.to_string(),
            serde_json::Value::String(value.to_string()),
        );
    }
    let json = serde_json::to_vec(&serde_json::Value::Object(object))?;
    json.as_slice().compressed_vec(compression)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use bytes::Bytes;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    struct WrittenArchive {
        bytes: Vec<u8>,
        header: Header,
    }

    impl WrittenArchive {
        fn root_directory(&self) -> Directory {
            let start = usize::try_from(self.header.root_offset).unwrap();
            let end = start + usize::try_from(self.header.root_length).unwrap();
            let decompressed = gunzip(&self.bytes[start..end]);
            Directory::try_from(Bytes::from(decompressed)).unwrap()
        }

        fn tile_data(&self, entry: &DirEntry) -> &[u8] {
            let start =
                usize::try_from(self.header.data_offset + entry.offset).unwrap();
            let end = start + entry.length as usize;
            &self.bytes[start..end]
        }
    }

    fn write_archive(saves: &[(Tile, &[u8])]) -> WrittenArchive {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.pmtiles");

        let mut metadata = TilesetMetadata::new();
        metadata.set("name", "test");
        metadata.set("format", "pbf");

        let mut writer = PmtilesWriter::new(&path, metadata).unwrap();
        writer.create_tiles().unwrap();
        for (tile, data) in saves {
            writer.save(*tile, data).unwrap();
        }
        writer
            .assign_spatial_metadata(&LngLatBbox::new(-180.0, -85.0, 180.0, 85.0), 0, 2)
            .unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = Header::try_from_bytes(Bytes::copy_from_slice(&bytes[..HEADER_SIZE])).unwrap();
        WrittenArchive { bytes, header }
    }

    #[test]
    fn fnv1a_128_of_empty_input_is_the_offset_basis() {
        assert_eq!(fnv1a_128(&[]), FNV128_OFFSET_BASIS);
    }

    #[test]
    fn fnv1a_128_distinguishes_payloads() {
        assert_eq!(fnv1a_128(b"tile"), fnv1a_128(b"tile"));
        assert_ne!(fnv1a_128(b"tile a"), fnv1a_128(b"tile b"));
    }

    #[test]
    fn five_coordinates_two_payloads() {
        let ocean: &[u8] = b"ocean";
        let land: &[u8] = b"land";
        let archive = write_archive(&[
            (Tile::new(1, 0, 0), ocean),
            (Tile::new(1, 1, 0), ocean),
            (Tile::new(1, 0, 1), land),
            (Tile::new(1, 1, 1), ocean),
            (Tile::new(0, 0, 0), land),
        ]);

        let header = &archive.header;
        assert_eq!(header.n_addressed_tiles.map(NonZeroU64::get), Some(5));
        assert_eq!(header.n_tile_entries.map(NonZeroU64::get), Some(5));
        assert_eq!(header.n_tile_contents.map(NonZeroU64::get), Some(2));

        let root = archive.root_directory();
        assert_eq!(root.entries().len(), 5);
        let ids: Vec<u64> = root.entries().iter().map(|e| e.tile_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "directory must be ordered by tile id");

        // Deduplication: five entries point at only two byte ranges.
        let mut ranges: Vec<(u64, u32)> = root
            .entries()
            .iter()
            .map(|e| (e.offset, e.length))
            .collect();
        ranges.sort_unstable();
        ranges.dedup();
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn payloads_are_stored_gzipped() {
        let archive = write_archive(&[(Tile::new(0, 0, 0), b"raw vector bytes".as_slice())]);
        let root = archive.root_directory();
        let stored = archive.tile_data(&root.entries()[0]);
        assert_eq!(gunzip(stored), b"raw vector bytes");
    }

    #[test]
    fn already_gzipped_payloads_pass_through_verbatim() {
        let payload = gzip(b"pre-compressed");
        let archive = write_archive(&[(Tile::new(0, 0, 0), payload.as_slice())]);
        let root = archive.root_directory();
        assert_eq!(archive.tile_data(&root.entries()[0]), payload.as_slice());
    }

    #[test]
    fn regions_are_contiguous() {
        let archive = write_archive(&[
            (Tile::new(2, 1, 0), b"a".as_slice()),
            (Tile::new(2, 1, 1), b"b".as_slice()),
        ]);
        let header = &archive.header;
        assert_eq!(header.root_offset, HEADER_SIZE as u64);
        assert_eq!(
            header.metadata_offset,
            header.root_offset + header.root_length
        );
        assert_eq!(
            header.leaf_offset,
            header.metadata_offset + header.metadata_length
        );
        assert_eq!(header.data_offset, header.leaf_offset + header.leaf_length);
        assert_eq!(
            archive.bytes.len() as u64,
            header.data_offset + header.data_length
        );
        assert!(!header.clustered);

        // Metadata region decodes back to the JSON we wrote.
        let start = usize::try_from(header.metadata_offset).unwrap();
        let end = start + usize::try_from(header.metadata_length).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&gunzip(&archive.bytes[start..end])).unwrap();
        assert_eq!(json["name"], "test");
        assert_eq!(json["format"], "pbf");
    }

    #[test]
    fn spatial_metadata_lands_in_the_header() {
        let archive = write_archive(&[(Tile::new(0, 0, 0), b"x".as_slice())]);
        let header = &archive.header;
        assert_eq!(header.min_zoom, 0);
        assert_eq!(header.max_zoom, 2);
        assert!((header.min_longitude - -180.0).abs() < 1e-6);
        assert!((header.max_latitude - 85.0).abs() < 1e-6);
        assert!(header.center_longitude.abs() < 1e-6);
    }

    #[test]
    fn large_entry_sets_split_into_leaves() {
        // Synthetic entries, already sorted by id; enough of them that the
        // serialized root cannot fit in the reserved initial bytes.
        let entries: Vec<DirEntry> = (0..20_000u64)
            .map(|i| DirEntry {
                tile_id: i * 7,
                offset: i * 1000,
                length: 997 + (i % 31) as u32,
                run_length: 1,
            })
            .collect();

        let (root_bytes, leaves_bytes, num_leaves) =
            optimize_directories(&entries, MAX_INITIAL_BYTES - HEADER_SIZE, Compression::None)
                .unwrap();

        assert!(num_leaves > 0);
        assert!(!leaves_bytes.is_empty());
        assert!(root_bytes.len() <= MAX_INITIAL_BYTES - HEADER_SIZE);

        // Root entries are leaf pointers covering the whole leaf blob.
        let root = Directory::try_from(Bytes::from(root_bytes)).unwrap();
        assert_eq!(root.entries().len(), num_leaves);
        assert!(root.entries().iter().all(|entry| entry.run_length == 0));
        let last = root.entries().last().unwrap();
        assert_eq!(
            last.offset + u64::from(last.length),
            leaves_bytes.len() as u64
        );
    }
}
