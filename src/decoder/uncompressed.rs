//! The degenerate decoder: output bytes are input bytes. Kept as its own
//! module, alongside the real decoders, because the reader's dispatch table
//! treats all four drivers uniformly.

use std::fs::File;
use std::io::Read;

use crate::buffer::Buf;

/// Refills `out` straight from `file`. Returns `true` on EOF.
pub(crate) fn fill(out: &mut Buf, file: &mut File) -> std::io::Result<(usize, bool)> {
    let n = out.fill_with(|slice| file.read(slice))?;
    Ok((n, n == 0))
}
