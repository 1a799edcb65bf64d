pub(crate) mod buffer;
pub mod compression;
pub(crate) mod decoder;
pub(crate) mod detect;
pub mod error;
pub mod fast_seek;
pub mod reader;
pub mod writer;

pub use compression::CompressionType;
pub use error::{CompressError, ErrorCode};
pub use fast_seek::{Checkpoint, FastSeekIndex, SharedFastSeekIndex};
pub use reader::{Reader, DEFAULT_BUF_SIZE};
pub use writer::Writer;
