//! zstd decoder driver, built on `ruzstd`'s low-level `FrameDecoder`, which
//! is driven with explicit `&mut impl Read` arguments per call rather than
//! owning a reader for its lifetime — the same shape the teacher crate uses
//! in its own (prototype) compressed-file reader.

use std::fs::File;
use std::io::{self, Read};

use ruzstd::frame_decoder::{BlockDecodingStrategy, FrameDecoder};

use crate::buffer::Buf;
use crate::error::CompressError;

/// Feeds a pull-based decoder from the reader's staged input buffer first,
/// falling back to the fd once the buffer runs dry. Lives only for the
/// duration of a single `fill` call, so it borrows rather than owns.
struct FdFeed<'a> {
    input: &'a mut Buf,
    file: &'a mut File,
    raw_pos: &'a mut u64,
    eof: &'a mut bool,
}

impl<'a> Read for FdFeed<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.avail() == 0 && !*self.eof {
            let n = self.input.refill_from(self.file)?;
            *self.raw_pos += n as u64;
            if n == 0 {
                *self.eof = true;
            }
        }
        Ok(self.input.copy_out(buf))
    }
}

pub(crate) struct ZstdState {
    decoder: FrameDecoder,
    started: bool,
}

impl ZstdState {
    pub(crate) fn new() -> Self {
        ZstdState {
            decoder: FrameDecoder::new(),
            started: false,
        }
    }

    /// Returns `true` once the frame is fully decoded and no more output
    /// remains to collect, signaling the caller to fall back to format
    /// detection for whatever follows.
    pub(crate) fn fill(
        &mut self,
        input: &mut Buf,
        output: &mut Buf,
        file: &mut File,
        raw_pos: &mut u64,
        eof: &mut bool,
    ) -> Result<bool, CompressError> {
        output.reset();
        loop {
            if self.decoder.can_collect() > 0 {
                break;
            }
            if self.started && self.decoder.is_finished() {
                return Ok(true);
            }
            let mut feed = FdFeed { input, file, raw_pos, eof };
            if !self.started {
                self.decoder
                    .reset(&mut feed)
                    .map_err(|e| CompressError::Decompress(e.to_string()))?;
                self.started = true;
            }
            self.decoder
                .decode_blocks(&mut feed, BlockDecodingStrategy::UptoBlocks(1))
                .map_err(|e| CompressError::Decompress(e.to_string()))?;
            if self.decoder.can_collect() == 0 && self.decoder.is_finished() {
                return Ok(true);
            }
            if self.decoder.can_collect() == 0 && *eof {
                return Err(CompressError::ShortRead);
            }
        }

        // A single block's worth of output (at most 128 KiB by the zstd
        // block-size cap) is expected to fit in one output buffer fill; the
        // reader's default buffer sizing keeps comfortable headroom above
        // that so this never needs to split a drain across two calls.
        if let Some(collected) = self.decoder.collect() {
            let n = collected.len().min(output.capacity());
            debug_assert_eq!(n, collected.len(), "zstd block larger than the output buffer");
            output.fill_with(|slice| {
                slice[..n].copy_from_slice(&collected[..n]);
                Ok(n)
            })?;
        }
        Ok(false)
    }
}
