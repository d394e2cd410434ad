use std::fs;
use std::path::{Path, PathBuf};

use crate::bbox::LngLatBbox;
use crate::tile::Tile;
use crate::writer::TileWriter;
use crate::{TilePackError, TilePackResult};

/// Writes each tile to `<root>/<z>/<x>/<y>.<format>` on the local
/// filesystem. No metadata, no deduplication.
pub struct DiskWriter {
    root: PathBuf,
    format: String,
    has_tiles: bool,
}

impl DiskWriter {
    pub fn new(root: impl AsRef<Path>, format: impl Into<String>) -> TilePackResult<Self> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            format: format.into(),
            has_tiles: false,
        })
    }
}

impl TileWriter for DiskWriter {
    fn create_tiles(&mut self) -> TilePackResult<()> {
        if self.has_tiles {
            return Ok(());
        }

        match fs::metadata(&self.root) {
            Ok(info) if !info.is_dir() => {
                return Err(TilePackError::RootNotADirectory(self.root.clone()));
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)?;
            }
            Err(err) => return Err(err.into()),
        }

        self.has_tiles = true;
        Ok(())
    }

    fn save(&mut self, tile: Tile, data: &[u8]) -> TilePackResult<()> {
        let path = self
            .root
            .join(tile.z.to_string())
            .join(tile.x.to_string())
            .join(format!("{}.{}", tile.y, self.format));

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, data)?;
        Ok(())
    }

    fn assign_spatial_metadata(
        &mut self,
        _bounds: &LngLatBbox,
        _min_zoom: u8,
        _max_zoom: u8,
    ) -> TilePackResult<()> {
        Ok(())
    }

    fn close(&mut self) -> TilePackResult<()> {
        Ok(())
    }
}
