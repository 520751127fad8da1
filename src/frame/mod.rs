//! LZMA2 chunk container: chunk headers and the single-stream encoder and
//! decoder built on the `lzma` engine.

pub mod chunk;
pub mod reader;
pub mod writer;

// Re-export key public API items at the module level.
pub use chunk::{ChunkHeader, LzmaProps, ResetState, COMPRESSED_SIZE_MAX, END_MARKER, UNCOMPRESSED_SIZE_MAX};
pub use reader::Lzma2Reader;
pub use writer::{ChunkEncoder, Lzma2Writer};
