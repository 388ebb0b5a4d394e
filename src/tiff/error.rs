use super::TagId;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TiffError {
    #[error("not a TIFF: bad magic bytes")]
    BadMagicBytes,
    #[error("missing tag {0:?}")]
    MissingTag(TagId),
    #[error("tag {0:?} has unexpected values")]
    BadTag(TagId),
    #[error("IFD chain revisits offset {0}")]
    IfdLoop(u64),
    #[error("read error: {0}")]
    ReadError(#[from] io::Error),
}

impl TiffError {
    /// True when the parse ran past the end of the bytes it was given.
    pub fn is_truncated(&self) -> bool {
        matches!(self, TiffError::ReadError(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}
