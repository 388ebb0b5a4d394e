use crate::raster::RasterError;
use crate::tiff::{TagId, TiffError};
use std::io;
use thiserror::Error;

pub type CogResult<T> = Result<T, CogError>;

#[derive(Debug, Error)]
pub enum CogError {
    #[error("bad TIFF: {0}")]
    BadTiff(#[from] TiffError),
    #[error("missing GeoTIFF tag {0:?}")]
    MissingGeoTag(TagId),
    #[error("GeoKeyDirectory has no EPSG code")]
    MissingEpsg,
    #[error("invalid georeferencing: {0}")]
    BadGeoReference(String),
    #[error("no tiled image levels")]
    NoLevels,
    #[error("tile index {0} out of range (max {1})")]
    TileIndexOutOfRange(usize, usize),
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("{0} not supported")]
    NotSupported(String),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("read error: {0}")]
    ReadError(#[from] io::Error),
    #[error("tile task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
