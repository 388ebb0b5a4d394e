use crate::cog::CogError;
use std::io;
use thiserror::Error;

pub type EncodeResult<T> = Result<T, EncodeError>;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("write failed: {0}")]
    WriteError(#[from] io::Error),
    #[error("unsupported projection EPSG:{0}: {1}")]
    UnsupportedProjection(u16, String),
    #[error("compression failed: {0}")]
    CompressionError(#[from] CogError),
    #[error("{0}")]
    NotSupported(String),
}
