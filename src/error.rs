use std::path::PathBuf;
use std::string::FromUtf8Error;

use thiserror::Error;

/// A specialized [`Result`] type for tilepack operations.
pub type TilePackResult<T> = Result<T, TilePackError>;

/// Errors that can occur while harvesting tiles or reading/writing archives.
#[derive(Debug, Error)]
pub enum TilePackError {
    #[error("invalid bounding box: {0}")]
    InvalidBounds(String),
    #[error("invalid zoom level {0}, must be 0..=30")]
    InvalidZoom(u8),
    #[error("metadata is missing {0}")]
    MissingMetadata(&'static str),
    #[error("invalid {key} metadata: {value}")]
    InvalidMetadata { key: &'static str, value: String },
    #[error("unknown output mode {0}")]
    UnknownOutputMode(String),
    #[error("archive root {0} is not a directory")]
    RootNotADirectory(PathBuf),
    #[error("HTTP status {code}: {status}")]
    HttpStatus { code: u16, status: String },
    #[error("ran out of HTTP GET retries for {0}")]
    RetriesExhausted(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid metadata UTF-8 encoding: {0}")]
    InvalidMetadataUtf8Encoding(#[from] FromUtf8Error),
    #[error("invalid magic number")]
    InvalidMagicNumber,
    #[error("unsupported PMTiles version")]
    UnsupportedPmTilesVersion,
    #[error("invalid PMTiles header")]
    InvalidHeader,
    #[error("invalid PMTiles entry")]
    InvalidEntry,
    #[error("invalid compression")]
    InvalidCompression,
    #[error("invalid tile type")]
    InvalidTileType,
    #[error("directory entry length overflows u32")]
    IndexEntryOverflow,
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
