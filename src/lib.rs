//! LZMA2 chunk container with a block-parallel encoder and decoder.
//!
//! The byte format is a sequence of chunks terminated by `0x00`; see
//! [`frame::chunk`]. [`frame::Lzma2Writer`] and [`frame::Lzma2Reader`] are the
//! single-stream codec; [`io::ParallelWriter`] and [`io::ParallelReader`]
//! split the work into blocks (or dictionary-reset groups) handled by a
//! worker pool. Output is identical in shape either way and any stream can
//! be read by either decoder.
//!
//! ```no_run
//! use lzma2::{compress, decompress, StreamOptions};
//!
//! let options = StreamOptions::with_preset(3)?;
//! let packed = compress(b"hello hello hello", &options)?;
//! assert_eq!(decompress(&packed, &options)?, b"hello hello hello");
//! # Ok::<(), lzma2::Lzma2Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod io;
pub mod lzma;
pub mod options;
pub mod threadpool;

use std::io::{Read, Write};

pub use error::{Lzma2Error, Result};
pub use frame::{ChunkHeader, LzmaProps, ResetState, Lzma2Reader, Lzma2Writer};
pub use io::{CloseHandle, ParallelReader, ParallelWriter, StreamReader, StreamWriter};
pub use options::{DictMode, MatchFinder, Mode, ParallelConfig, StreamOptions};

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

/// Compress `data` into a complete stream, in parallel when `options`
/// carries a [`ParallelConfig`].
pub fn compress(data: &[u8], options: &StreamOptions) -> Result<Vec<u8>> {
    let mut w = StreamWriter::new(Vec::with_capacity(data.len() / 2 + 64), options)?;
    w.write_all(data)?;
    w.finish()
}

/// Decode a complete stream. Bytes after the end marker are an error.
pub fn decompress(data: &[u8], options: &StreamOptions) -> Result<Vec<u8>> {
    let mut r = StreamReader::new(data, options)?;
    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    if !r.get_ref().is_empty() {
        return Err(Lzma2Error::CorruptedInput("trailing data after end marker"));
    }
    Ok(out)
}
