use std::fmt::{Debug, Formatter};

use bytes::{Buf, Bytes};
use varint_rs::{VarintReader, VarintWriter};

use crate::writer::pmtiles::WriteTo;
use crate::{TilePackError, TilePackResult};

/// A single directory entry: a tile id mapped to a byte range in the tile
/// data region, or (with `run_length == 0`) to a leaf directory.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

/// An ordered set of directory entries, ascending by tile id.
#[derive(Default, Clone)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    #[must_use]
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }
}

impl WriteTo for Directory {
    fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_usize_varint(self.entries.len())?;

        // Tile IDs, delta-encoded
        let mut last_id = 0;
        for entry in &self.entries {
            writer.write_u64_varint(entry.tile_id - last_id)?;
            last_id = entry.tile_id;
        }

        // Run lengths
        for entry in &self.entries {
            writer.write_u32_varint(entry.run_length)?;
        }

        // Lengths
        for entry in &self.entries {
            writer.write_u32_varint(entry.length)?;
        }

        // Offsets: 0 when contiguous with the previous entry, offset + 1 otherwise
        let mut next_contiguous = None;
        for entry in &self.entries {
            if next_contiguous == Some(entry.offset) {
                writer.write_u64_varint(0)?;
            } else {
                writer.write_u64_varint(entry.offset + 1)?;
            }
            next_contiguous = Some(entry.offset + u64::from(entry.length));
        }

        Ok(())
    }
}

impl TryFrom<Bytes> for Directory {
    type Error = TilePackError;

    fn try_from(buffer: Bytes) -> TilePackResult<Self> {
        let mut buffer = buffer.reader();
        let n_entries = buffer.read_usize_varint()?;

        let mut entries = vec![DirEntry::default(); n_entries];

        // Read tile IDs
        let mut next_tile_id = 0;
        for entry in &mut entries {
            next_tile_id += buffer.read_u64_varint()?;
            entry.tile_id = next_tile_id;
        }

        // Read Run Lengths
        for entry in &mut entries {
            entry.run_length = buffer.read_u32_varint()?;
        }

        // Read Lengths
        for entry in &mut entries {
            entry.length = buffer.read_u32_varint()?;
        }

        // Read Offsets
        let mut last_entry: Option<&DirEntry> = None;
        for entry in entries.iter_mut() {
            let offset = buffer.read_u64_varint()?;
            entry.offset = if offset == 0 {
                let e = last_entry.ok_or(TilePackError::InvalidEntry)?;
                e.offset + u64::from(e.length)
            } else {
                offset - 1
            };
            last_entry = Some(entry);
        }

        Ok(Directory { entries })
    }
}
