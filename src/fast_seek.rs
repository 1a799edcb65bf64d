//! Append-only index of decoder-state checkpoints, sorted by output
//! (logical, decompressed) offset, enabling a seek to resume decoding partway
//! through a stream instead of from the start.

use std::cell::RefCell;
use std::rc::Rc;

/// Minimum spacing, in decompressed bytes, between two checkpoints.
pub const SPAN: u64 = 1_048_576;

/// 32 KiB, the deflate sliding-window size a mid-stream resume needs.
pub const DEFLATE_WINDOW: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub enum Checkpoint {
    /// Taken for uncompressed input: raw and logical offsets coincide.
    Uncompressed { raw_pos: u64, out_pos: u64 },
    /// Taken immediately after a gzip header is parsed, before any deflate
    /// block has been decoded. Always valid to resume from: it is exactly
    /// equivalent to opening the file and skipping the header.
    DeflateAfterHeader { raw_pos: u64, out_pos: u64 },
    /// A mid-stream deflate checkpoint with enough state to resume without
    /// reprocessing from the start: the trailing window, the running CRC,
    /// and the bit position within the current byte.
    Deflate {
        raw_pos: u64,
        out_pos: u64,
        bit_offset: u8,
        crc_so_far: u32,
        total_out: u64,
        window: Box<[u8; DEFLATE_WINDOW]>,
    },
}

impl Checkpoint {
    pub fn out_pos(&self) -> u64 {
        match self {
            Checkpoint::Uncompressed { out_pos, .. }
            | Checkpoint::DeflateAfterHeader { out_pos, .. }
            | Checkpoint::Deflate { out_pos, .. } => *out_pos,
        }
    }

    pub fn raw_pos(&self) -> u64 {
        match self {
            Checkpoint::Uncompressed { raw_pos, .. }
            | Checkpoint::DeflateAfterHeader { raw_pos, .. }
            | Checkpoint::Deflate { raw_pos, .. } => *raw_pos,
        }
    }
}

/// A grow-only, offset-sorted checkpoint list. Multiple [`crate::reader::Reader`]s
/// opened on the same underlying path may share one instance via
/// [`crate::reader::Reader::set_random_access`], so a checkpoint taken by one
/// reader's forward read benefits a sibling reader's later seek.
#[derive(Debug, Default)]
pub struct FastSeekIndex {
    points: Vec<Checkpoint>,
}

pub type SharedFastSeekIndex = Rc<RefCell<FastSeekIndex>>;

impl FastSeekIndex {
    pub fn new() -> Self {
        FastSeekIndex { points: Vec::new() }
    }

    pub fn shared() -> SharedFastSeekIndex {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append `cp` if it advances the index: the array only ever grows at
    /// the tail, and two checkpoints at the same (or a regressing) output
    /// offset would make the binary search in `find` ambiguous.
    pub fn push(&mut self, cp: Checkpoint) {
        if self.points.last().map(|last| cp.out_pos() > last.out_pos()).unwrap_or(true) {
            self.points.push(cp);
        }
    }

    /// The closest checkpoint at or before `target_out_pos`, if any.
    pub fn find(&self, target_out_pos: u64) -> Option<&Checkpoint> {
        match self.points.binary_search_by_key(&target_out_pos, |cp| cp.out_pos()) {
            Ok(idx) => Some(&self.points[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.points[idx - 1]),
        }
    }
}
