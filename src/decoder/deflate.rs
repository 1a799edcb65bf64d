//! Raw-deflate decoder driver for the gzip-wrapped case: the gzip header has
//! already been consumed by `detect::identify`, so this drives a headerless
//! `flate2::Decompress` across the remaining bytes and verifies the gzip
//! trailer (CRC32 + ISIZE) once the deflate stream itself ends.

use std::fs::File;

use flate2::{Decompress, FlushDecompress, Status};

use crate::buffer::Buf;
use crate::error::CompressError;
use crate::fast_seek::DEFLATE_WINDOW;

pub(crate) enum Outcome {
    /// More output was produced; stay in this mode for the next call.
    Produced,
    /// The deflate stream (and gzip trailer) ended. `trailer_error`, if
    /// present, is not surfaced immediately — bytes already placed in the
    /// output buffer by this call are still handed back to the caller
    /// first. The caller only sees the error on the *next* attempt to
    /// produce output.
    StreamEnd { trailer_error: Option<CompressError> },
}

pub(crate) struct DeflateState {
    inflate: Decompress,
    crc: crc32fast::Hasher,
    last_total_out: u64,
    window: RollingWindow,
    dont_check_crc: bool,
}

impl DeflateState {
    pub(crate) fn new(dont_check_crc: bool) -> Self {
        DeflateState {
            inflate: Decompress::new(false),
            crc: crc32fast::Hasher::new(),
            last_total_out: 0,
            window: RollingWindow::new(),
            dont_check_crc,
        }
    }

    pub(crate) fn fill(
        &mut self,
        input: &mut Buf,
        output: &mut Buf,
        file: &mut File,
        raw_pos: &mut u64,
        eof: &mut bool,
    ) -> Result<Outcome, CompressError> {
        output.reset();
        loop {
            if input.avail() == 0 && !*eof {
                let n = input.refill_from(file)?;
                *raw_pos += n as u64;
                if n == 0 {
                    *eof = true;
                }
            }
            if input.avail() == 0 {
                return Err(CompressError::ShortRead);
            }

            let before_in = self.inflate.total_in();
            let before_out = self.last_total_out;
            let status = self
                .inflate
                .decompress(input.unconsumed(), output.spare_mut(), FlushDecompress::None)
                .map_err(|e| CompressError::Decompress(e.to_string()))?;

            let consumed = (self.inflate.total_in() - before_in) as usize;
            input.consume(consumed);

            let produced = (self.inflate.total_out() - before_out) as usize;
            self.last_total_out = self.inflate.total_out();
            if produced > 0 {
                let written_range = 0..produced;
                let written = &output.spare_mut()[written_range];
                self.crc.update(written);
                self.window.feed(written);
                output.note_filled(produced);
            }

            // No block-boundary signal is observable through flate2's
            // public API (no Z_BLOCK flush, no data_type bit), so mid-stream
            // checkpoints never fire here; the window is still maintained
            // so the mechanism is ready if a future backend exposes one.
            // See DESIGN.md.

            match status {
                Status::StreamEnd => {
                    let trailer_error = self.verify_trailer(input, file, raw_pos, eof)?;
                    return Ok(Outcome::StreamEnd { trailer_error });
                }
                Status::Ok | Status::BufError => {
                    if output.avail() > 0 {
                        return Ok(Outcome::Produced);
                    }
                    // No output yet this call (only block-structural bytes
                    // were consumed, or input ran out short of a full
                    // block) — refill and try again rather than handing
                    // back an empty buffer, which the reader would read as
                    // a false EOF.
                    if consumed == 0 && produced == 0 && *eof {
                        return Err(CompressError::ShortRead);
                    }
                    continue;
                }
            }
        }
    }

    fn read_trailer_u32(
        &self,
        input: &mut Buf,
        file: &mut File,
        raw_pos: &mut u64,
        eof: &mut bool,
    ) -> Result<Option<u32>, CompressError> {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            if input.avail() == 0 {
                if *eof {
                    return Ok(None);
                }
                let n = input.refill_from(file)?;
                *raw_pos += n as u64;
                if n == 0 {
                    *eof = true;
                }
                if input.avail() == 0 {
                    return Ok(None);
                }
            }
            let mut one = [0u8];
            input.copy_out(&mut one);
            *b = one[0];
        }
        Ok(Some(u32::from_le_bytes(bytes)))
    }

    /// Reads the 8-byte gzip trailer. A short read or mismatch is stored for
    /// the caller to surface later rather than failing this call outright,
    /// so whatever valid output was already decoded is still delivered.
    fn verify_trailer(
        &mut self,
        input: &mut Buf,
        file: &mut File,
        raw_pos: &mut u64,
        eof: &mut bool,
    ) -> Result<Option<CompressError>, CompressError> {
        let stored_crc = match self.read_trailer_u32(input, file, raw_pos, eof)? {
            Some(v) => v,
            None => return Ok(Some(CompressError::ShortRead)),
        };
        let stored_len = match self.read_trailer_u32(input, file, raw_pos, eof)? {
            Some(v) => v,
            None => return Ok(Some(CompressError::ShortRead)),
        };

        let computed_crc = self.crc.clone().finalize();
        let computed_len = (self.last_total_out & 0xFFFF_FFFF) as u32;

        if computed_len != stored_len {
            return Ok(Some(CompressError::Decompress(
                "gzip trailer length mismatch".to_string(),
            )));
        }
        if !self.dont_check_crc && computed_crc != stored_crc {
            return Ok(Some(CompressError::Decompress(
                "gzip trailer CRC mismatch".to_string(),
            )));
        }
        Ok(None)
    }
}

/// Tracks the trailing `DEFLATE_WINDOW` bytes of decompressed output — the
/// state a mid-stream checkpoint would need to prime a fresh inflate context
/// before resuming. Maintained unconditionally even though this backend
/// never actually emits a mid-stream checkpoint (see the note in `fill`).
struct RollingWindow {
    buf: Box<[u8; DEFLATE_WINDOW]>,
    filled: usize,
    pos: usize,
}

impl RollingWindow {
    fn new() -> Self {
        RollingWindow {
            buf: Box::new([0u8; DEFLATE_WINDOW]),
            filled: 0,
            pos: 0,
        }
    }

    fn feed(&mut self, data: &[u8]) {
        if data.len() >= DEFLATE_WINDOW {
            self.buf.copy_from_slice(&data[data.len() - DEFLATE_WINDOW..]);
            self.pos = 0;
            self.filled = DEFLATE_WINDOW;
            return;
        }
        for &b in data {
            self.buf[self.pos] = b;
            self.pos = (self.pos + 1) % DEFLATE_WINDOW;
            self.filled = (self.filled + 1).min(DEFLATE_WINDOW);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buf;
    use std::io::{Seek, SeekFrom, Write};

    fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    fn scratch_file() -> File {
        let mut path = std::env::temp_dir();
        path.push(format!("capture-stream-test-{:?}", std::thread::current().id()));
        let f = File::create(&path).unwrap();
        std::fs::remove_file(&path).ok();
        f
    }

    #[test]
    fn decodes_small_payload_and_verifies_trailer() {
        let data = gzip_bytes(b"hello deflate world");
        // Skip the 10-byte minimal gzip header; header parsing itself is
        // exercised in `detect`'s tests.
        let body = &data[10..];

        let mut input = Buf::with_capacity(4096);
        let mut cursor = std::io::Cursor::new(body.to_vec());
        input.refill_from(&mut cursor).unwrap();

        let mut output = Buf::with_capacity(8192);
        let mut state = DeflateState::new(false);
        let mut raw_pos = 0u64;
        let mut eof = true;
        let mut scratch = scratch_file();
        scratch.seek(SeekFrom::Start(0)).unwrap();

        let outcome = state
            .fill(&mut input, &mut output, &mut scratch, &mut raw_pos, &mut eof)
            .unwrap();
        assert_eq!(output.unconsumed(), b"hello deflate world");
        match outcome {
            Outcome::StreamEnd { trailer_error } => assert!(trailer_error.is_none()),
            Outcome::Produced => panic!("expected stream end in one call for small payload"),
        }
    }

    #[test]
    fn flags_trailer_crc_mismatch() {
        let mut data = gzip_bytes(b"tamper with me");
        let last = data.len() - 5;
        data[last] ^= 0xFF; // corrupt one CRC byte

        let body = &data[10..];
        let mut input = Buf::with_capacity(4096);
        let mut cursor = std::io::Cursor::new(body.to_vec());
        input.refill_from(&mut cursor).unwrap();

        let mut output = Buf::with_capacity(8192);
        let mut state = DeflateState::new(false);
        let mut raw_pos = 0u64;
        let mut eof = true;
        let mut scratch = scratch_file();

        let outcome = state
            .fill(&mut input, &mut output, &mut scratch, &mut raw_pos, &mut eof)
            .unwrap();
        match outcome {
            Outcome::StreamEnd { trailer_error } => assert!(trailer_error.is_some()),
            Outcome::Produced => panic!("expected stream end"),
        }
    }
}
