//! Streaming writer for the gzip-wrapped deflate format — the one
//! compressed format this crate knows how to produce (zstd and lz4 are
//! read-only here, matching the compression-type registry's asymmetry).
//!
//! The gzip header and trailer are written by hand rather than delegated to
//! a wrapping encoder, so this module owns the exact same wire format the
//! reader's [`crate::decoder::deflate`] driver parses: a fixed 10-byte
//! header, a raw deflate stream, then a CRC32 + ISIZE trailer.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use flate2::{Compression, FlushCompress, Status};

use crate::error::CompressError;

/// Gzip header: ID1 ID2 CM FLG MTIME(4) XFL OS. MTIME is left at zero (no
/// timestamp is meaningful for a streamed capture file) and OS is the
/// conventional "unknown" value `0xFF`.
const GZIP_HEADER: [u8; 10] = [0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];

pub struct Writer {
    file: File,
    compress: flate2::Compress,
    crc: crc32fast::Hasher,
    total_in: u64,
    input: Vec<u8>,
    want: usize,
    scratch: Vec<u8>,
    err: Option<CompressError>,
    finished: bool,
}

impl Writer {
    /// Truncates or creates `path` and writes the gzip header immediately,
    /// matching the original's eager-header-write-on-open behavior.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, CompressError> {
        let file = File::create(path)?;
        Self::from_file(file)
    }

    pub fn from_file(mut file: File) -> Result<Self, CompressError> {
        file.write_all(&GZIP_HEADER)?;
        Ok(Writer {
            file,
            compress: flate2::Compress::new(Compression::default(), false),
            crc: crc32fast::Hasher::new(),
            total_in: 0,
            input: Vec::with_capacity(DEFAULT_WANT),
            want: DEFAULT_WANT,
            scratch: vec![0u8; DEFAULT_WANT],
            err: None,
            finished: false,
        })
    }

    pub fn error(&self) -> Option<&CompressError> {
        self.err.as_ref()
    }

    /// Buffers `buf` (if it's smaller than the internal want-size) or hands
    /// it straight to the backend once any already-buffered bytes have
    /// drained first — mirroring the original's "small writes accumulate,
    /// large writes bypass the buffer" rule.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, CompressError> {
        if let Some(e) = self.err.clone() {
            return Err(e);
        }
        if self.finished {
            return Ok(0);
        }

        if buf.len() < self.want {
            self.input.extend_from_slice(buf);
            if self.input.len() >= self.want {
                self.drain_input()?;
            }
            return Ok(buf.len());
        }

        self.drain_input()?;
        self.feed(buf, FlushCompress::None)?;
        Ok(buf.len())
    }

    fn drain_input(&mut self) -> Result<(), CompressError> {
        if self.input.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.input);
        let result = self.feed(&pending, FlushCompress::None);
        self.input = pending;
        self.input.clear();
        result
    }

    /// Runs `data` through the backend deflate context until every input
    /// byte is consumed, writing out whatever compressed output is produced
    /// along the way. Also folds `data` into the running CRC and total
    /// length, since the gzip trailer is computed over plaintext, not
    /// ciphertext.
    fn feed(&mut self, data: &[u8], flush: FlushCompress) -> Result<(), CompressError> {
        self.crc.update(data);
        self.total_in += data.len() as u64;

        let mut offset = 0usize;
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(&data[offset..], &mut self.scratch, flush)
                .map_err(|e| CompressError::Internal(e.to_string()))?;

            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            offset += consumed;
            if produced > 0 {
                let chunk = self.scratch[..produced].to_vec();
                self.write_out(&chunk)?;
            }

            match status {
                Status::StreamEnd => return Ok(()),
                Status::Ok | Status::BufError => {
                    if offset >= data.len() && produced == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn write_out(&mut self, bytes: &[u8]) -> Result<(), CompressError> {
        match self.file.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) => {
                let wrapped = if e.kind() == io::ErrorKind::WriteZero {
                    CompressError::ShortWrite
                } else {
                    CompressError::from(e)
                };
                self.err = Some(wrapped.clone());
                Err(wrapped)
            }
        }
    }

    /// Forces any buffered input through the backend with a sync flush and
    /// writes out whatever compressed bytes that produces, without ending
    /// the stream. A later `write_bytes` call can still append more data.
    pub fn flush_sync(&mut self) -> Result<(), CompressError> {
        if let Some(e) = self.err.clone() {
            return Err(e);
        }
        self.drain_input()?;
        self.feed(&[], FlushCompress::Sync)
    }

    /// Drains any buffered input, drives the backend to completion with a
    /// finish flush, appends the CRC32 + ISIZE trailer, and closes the
    /// file. Consumes `self` since no further writes are meaningful once
    /// the trailer has been appended.
    pub fn finish(mut self) -> Result<(), CompressError> {
        self.finish_impl()
    }

    fn finish_impl(&mut self) -> Result<(), CompressError> {
        if let Some(e) = self.err.clone() {
            return Err(e);
        }
        if self.finished {
            return Ok(());
        }
        self.drain_input()?;
        self.feed(&[], FlushCompress::Finish)?;
        self.finished = true;

        let crc = self.crc.clone().finalize();
        let len = (self.total_in & 0xFFFF_FFFF) as u32;
        let mut trailer = [0u8; 8];
        trailer[0..4].copy_from_slice(&crc.to_le_bytes());
        trailer[4..8].copy_from_slice(&len.to_le_bytes());
        self.write_out(&trailer)?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for Writer {
    /// Best-effort finalization for a `Writer` dropped without an explicit
    /// `finish()` call, matching `flate2::write::GzEncoder`'s own
    /// finalize-on-drop behavior: otherwise the file is left truncated
    /// before the backend's finish flush and missing its CRC32+ISIZE
    /// trailer, with no error ever surfaced. Errors here have nowhere to
    /// go, so they're swallowed the same way `GzEncoder::drop` swallows
    /// them.
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish_impl();
        }
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_sync().map_err(Into::into)
    }
}

/// Default want-size for the writer's input/output staging buffers,
/// matching [`crate::reader::DEFAULT_BUF_SIZE`].
const DEFAULT_WANT: usize = crate::reader::DEFAULT_BUF_SIZE;
