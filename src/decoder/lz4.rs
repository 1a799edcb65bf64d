//! lz4 frame-format decoder driver, built on `lz4_flex::frame::FrameDecoder`.
//!
//! Unlike the zstd backend, `lz4_flex`'s frame decoder owns its source for
//! its whole lifetime (it implements `Read` over `R`, not a pull-per-call
//! API), so it cannot borrow the reader's staged input buffer call by call.
//! Instead, `detect::identify` hands this driver a duplicated file
//! descriptor (`File::try_clone`) when lz4 magic bytes are recognized: a
//! `dup`'d fd shares the same underlying file offset as the original, so
//! reads through either handle stay consistent, and the reader's `raw_pos`
//! bookkeeping is simply re-synced from the shared position after each call
//! rather than tracked incrementally.

use std::fs::File;
use std::io::{Read, Seek};

use lz4_flex::frame::FrameDecoder;

use crate::buffer::Buf;
use crate::error::CompressError;

pub(crate) struct Lz4State {
    decoder: FrameDecoder<File>,
}

impl Lz4State {
    pub(crate) fn new(dup: File) -> Self {
        Lz4State {
            decoder: FrameDecoder::new(dup),
        }
    }

    /// Fills `output` from the lz4 stream. Returns `(bytes produced, stream
    /// ended)`; the caller re-derives `raw_pos` from the shared fd position
    /// afterward.
    pub(crate) fn fill(&mut self, output: &mut Buf) -> Result<(usize, bool), CompressError> {
        let n = output.fill_with(|slice| self.decoder.read(slice))?;
        Ok((n, n == 0))
    }
}

/// Rewinds `file` by the number of unconsumed bytes sitting in `input`
/// (since those bytes were already pulled off the fd into the buffer but
/// not yet handed to a decoder), then hands back a duplicate descriptor
/// positioned at the true start of the lz4 stream. `input` is left empty:
/// the lz4 driver reads straight from its own fd from here on.
pub(crate) fn rewind_and_duplicate(file: &mut File, input: &mut Buf, raw_pos: &mut u64) -> std::io::Result<File> {
    let unread = input.avail() as i64;
    if unread > 0 {
        file.seek(std::io::SeekFrom::Current(-unread))?;
        *raw_pos -= unread as u64;
    }
    input.reset();
    file.try_clone()
}
