//! The four format-specific decoder drivers, plus the `Mode` enum the
//! reader's fill loop dispatches on. Each driver owns exactly the state it
//! needs to resume decoding across calls; none of them own the reader's
//! buffers or file, which stay on `Reader` and are passed in by reference.

pub(crate) mod deflate;
pub(crate) mod lz4;
pub(crate) mod uncompressed;
pub(crate) mod zstd;

use deflate::DeflateState;
use lz4::Lz4State;
use zstd::ZstdState;

pub(crate) enum Mode {
    /// No compressed-format magic has been matched yet (or re-detection is
    /// needed after a stream ended).
    Unknown,
    Uncompressed,
    Deflate(DeflateState),
    Zstd(ZstdState),
    Lz4(Lz4State),
}

impl Mode {
    pub(crate) fn is_unknown(&self) -> bool {
        matches!(self, Mode::Unknown)
    }
}
