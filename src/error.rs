//! Error type shared by the writer and the reader.

use thiserror::Error;

/// Errors produced by the ZIP engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value cannot be encoded (empty or oversized name,
    /// a value that does not fit a 32-bit field, a poisoned writer).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The archive bytes do not follow the format: bad signature, truncated
    /// record, missing trailer, size mismatch.
    #[error("invalid ZIP archive: {0}")]
    Format(String),

    /// The archive uses something this crate does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The underlying sink or source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
