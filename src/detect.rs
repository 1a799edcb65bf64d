//! Format auto-detection: sniffs the first bytes of a stream to decide
//! which decoder driver to hand control to, and — for gzip — walks the
//! whole variable-length header before handing off to the deflate driver.

use crate::decoder::deflate::DeflateState;
use crate::decoder::lz4::{rewind_and_duplicate, Lz4State};
use crate::decoder::zstd::ZstdState;
use crate::decoder::Mode;
use crate::compression::CompressionType;
use crate::error::CompressError;
use crate::fast_seek::Checkpoint;
use crate::reader::Reader;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const LZ4_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

/// gzip FLG bit flags, RFC 1952.
const FLG_FTEXT: u8 = 0x01;
const FLG_FHCRC: u8 = 0x02;
const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;
const FLG_RESERVED: u8 = 0xE0;

pub(crate) fn identify(r: &mut Reader) -> Result<(), CompressError> {
    ensure_some_input(r)?;
    if r.in_buf.avail() == 0 {
        // Nothing at all to detect — an empty file. Leave mode Unknown;
        // the caller observes EOF with zero bytes produced.
        return Ok(());
    }

    if r.in_buf.peek() == Some(0x1F) {
        r.in_buf.consume(1);
        ensure_some_input(r)?;
        if r.in_buf.peek() == Some(0x8B) {
            r.in_buf.consume(1);
            return begin_gzip(r);
        }
        // Not a gzip magic after all — unget the lone 0x1F so it's treated
        // as the first byte of an uncompressed stream.
        r.in_buf.unconsume(1);
    }

    if r.in_buf.unconsumed().starts_with(&ZSTD_MAGIC) {
        return begin_zstd(r);
    }
    if r.in_buf.unconsumed().starts_with(&LZ4_MAGIC) {
        return begin_lz4(r);
    }

    begin_uncompressed(r)
}

fn ensure_some_input(r: &mut Reader) -> Result<(), CompressError> {
    if r.in_buf.avail() == 0 && !r.eof {
        let n = r.in_buf.refill_from(&mut r.file)?;
        r.raw_pos += n as u64;
        if n == 0 {
            r.eof = true;
        }
    }
    Ok(())
}

fn next_byte(r: &mut Reader) -> Result<u8, CompressError> {
    ensure_some_input(r)?;
    if r.in_buf.avail() == 0 {
        return Err(CompressError::ShortRead);
    }
    let mut one = [0u8];
    r.in_buf.copy_out(&mut one);
    Ok(one[0])
}

fn skip_bytes(r: &mut Reader, mut n: usize) -> Result<(), CompressError> {
    while n > 0 {
        next_byte(r)?;
        n -= 1;
    }
    Ok(())
}

fn skip_nul_terminated(r: &mut Reader) -> Result<(), CompressError> {
    loop {
        if next_byte(r)? == 0 {
            return Ok(());
        }
    }
}

fn record_checkpoint(r: &mut Reader, make: impl FnOnce(u64, u64) -> Checkpoint) {
    if let Some(shared) = r.fast_seek.clone() {
        let raw_pos = r.raw_pos - r.in_buf.avail() as u64;
        let out_pos = r.tell();
        shared.borrow_mut().push(make(raw_pos, out_pos));
    }
}

fn begin_gzip(r: &mut Reader) -> Result<(), CompressError> {
    let cm = next_byte(r)?;
    if cm != 8 {
        return Err(CompressError::Decompress(format!(
            "unknown compression method {cm}"
        )));
    }
    let flg = next_byte(r)?;
    if flg & FLG_RESERVED != 0 {
        return Err(CompressError::Decompress("reserved gzip flag bits set".to_string()));
    }
    skip_bytes(r, 6)?; // MTIME(4) XFL(1) OS(1)

    if flg & FLG_FEXTRA != 0 {
        let lo = next_byte(r)? as u16;
        let hi = next_byte(r)? as u16;
        let xlen = lo | (hi << 8);
        skip_bytes(r, xlen as usize)?;
    }
    if flg & FLG_FNAME != 0 {
        skip_nul_terminated(r)?;
    }
    if flg & FLG_FCOMMENT != 0 {
        skip_nul_terminated(r)?;
    }
    if flg & FLG_FHCRC != 0 {
        skip_bytes(r, 2)?;
    }
    let _ = FLG_FTEXT; // not meaningful to a byte-oriented reader

    r.set_mode(Mode::Deflate(DeflateState::new(r.dont_check_crc)));
    r.set_compression(CompressionType::Gzip);
    record_checkpoint(r, |raw_pos, out_pos| Checkpoint::DeflateAfterHeader { raw_pos, out_pos });
    Ok(())
}

fn begin_zstd(r: &mut Reader) -> Result<(), CompressError> {
    r.set_mode(Mode::Zstd(ZstdState::new()));
    r.set_compression(CompressionType::Zstd);
    Ok(())
}

fn begin_lz4(r: &mut Reader) -> Result<(), CompressError> {
    let dup = rewind_and_duplicate(&mut r.file, &mut r.in_buf, &mut r.raw_pos)?;
    r.set_mode(Mode::Lz4(Lz4State::new(dup)));
    r.set_compression(CompressionType::Lz4);
    Ok(())
}

fn begin_uncompressed(r: &mut Reader) -> Result<(), CompressError> {
    record_checkpoint(r, |raw_pos, out_pos| Checkpoint::Uncompressed { raw_pos, out_pos });
    r.set_compression(CompressionType::Uncompressed);

    if r.in_buf.avail() > 0 {
        let leftover: Vec<u8> = r.in_buf.unconsumed().to_vec();
        r.in_buf.reset();
        r.out.fill_with(|slice| {
            slice[..leftover.len()].copy_from_slice(&leftover);
            Ok(leftover.len())
        })?;
    }
    r.set_mode(Mode::Uncompressed);
    Ok(())
}
