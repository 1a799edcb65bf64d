//! Error taxonomy for the reader and writer.
//!
//! The variant set mirrors the `WTAP_ERR_*` codes of the system this crate
//! is modeled on: callers that need the raw numeric code for interop can
//! match on [`CompressError::code`].

use std::fmt;

/// Sticky error codes, preserved verbatim so a caller bridging to a C-style
/// integer error code gets the same numbers regardless of which variant
/// carries a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ShortRead,
    Decompress,
    DecompressionNotSupported,
    ShortWrite,
    Internal,
    /// An OS `errno`, passed through unchanged.
    Os(i32),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompressError {
    /// Premature EOF while parsing a header or trailer.
    #[error("short read")]
    ShortRead,

    /// A backend decoder rejected the stream; carries its message.
    #[error("decompression error: {0}")]
    Decompress(String),

    /// Magic bytes for a compressed format were recognized, but the
    /// backend for that format was not compiled in.
    #[error("decompression not supported: {0}")]
    DecompressionNotSupported(String),

    /// The underlying fd accepted fewer bytes than requested.
    #[error("short write")]
    ShortWrite,

    /// An invariant the reader relies on was violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// An OS-level I/O error, passed through.
    #[error("I/O error: {0}")]
    Io(std::sync::Arc<std::io::Error>),
}

impl CompressError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CompressError::ShortRead => ErrorCode::ShortRead,
            CompressError::Decompress(_) => ErrorCode::Decompress,
            CompressError::DecompressionNotSupported(_) => ErrorCode::DecompressionNotSupported,
            CompressError::ShortWrite => ErrorCode::ShortWrite,
            CompressError::Internal(_) => ErrorCode::Internal,
            CompressError::Io(e) => ErrorCode::Os(e.raw_os_error().unwrap_or(0)),
        }
    }

    /// The extra human-readable message, if any, matching `err_info` in the
    /// taxonomy this crate follows.
    pub fn info(&self) -> Option<String> {
        match self {
            CompressError::Decompress(s) | CompressError::DecompressionNotSupported(s) | CompressError::Internal(s) => {
                Some(s.clone())
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for CompressError {
    fn from(e: std::io::Error) -> Self {
        CompressError::Io(std::sync::Arc::new(e))
    }
}

impl From<CompressError> for std::io::Error {
    fn from(e: CompressError) -> Self {
        match e {
            CompressError::Io(inner) => match std::sync::Arc::try_unwrap(inner) {
                Ok(err) => err,
                Err(rc) => std::io::Error::new(rc.kind(), rc.to_string()),
            },
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ShortRead => write!(f, "short read"),
            ErrorCode::Decompress => write!(f, "decompression error"),
            ErrorCode::DecompressionNotSupported => write!(f, "decompression not supported"),
            ErrorCode::ShortWrite => write!(f, "short write"),
            ErrorCode::Internal => write!(f, "internal error"),
            ErrorCode::Os(errno) => write!(f, "os error {errno}"),
        }
    }
}
