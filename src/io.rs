//! Stream-level I/O: the parallel block pipeline and the adapters that pick
//! between it and the single-stream codec.
//!
//! [`StreamWriter`] and [`StreamReader`] look at the options they are given:
//! with a [`ParallelConfig`](crate::options::ParallelConfig) attached they
//! run the block-parallel frontends, otherwise the plain
//! [`Lzma2Writer`]/[`Lzma2Reader`]. Both produce and accept the same byte
//! format.

pub mod buffer_pool;
pub mod manager;
pub mod par_reader;
pub mod par_writer;
pub mod reorder;

use std::io::{self, Read, Write};

use crate::error::Result;
use crate::frame::{Lzma2Reader, Lzma2Writer};
use crate::options::StreamOptions;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use manager::{preset_len, CloseHandle, ParallelManager, Session};
pub use par_reader::ParallelReader;
pub use par_writer::ParallelWriter;
pub use reorder::ReorderBuffer;

// ── StreamWriter ─────────────────────────────────────────────────────────────

/// Encoder that is parallel when the options ask for it.
pub enum StreamWriter<W: Write> {
    Single(Lzma2Writer<W>),
    Parallel(ParallelWriter<W>),
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W, options: &StreamOptions) -> Result<Self> {
        if options.parallel().is_some() {
            Ok(StreamWriter::Parallel(ParallelWriter::new(inner, options)?))
        } else {
            Ok(StreamWriter::Single(Lzma2Writer::new(inner, options)))
        }
    }

    /// Close handle of the parallel frontend; `None` for a single stream.
    pub fn close_handle(&self) -> Option<CloseHandle> {
        match self {
            StreamWriter::Single(_) => None,
            StreamWriter::Parallel(w) => Some(w.close_handle()),
        }
    }

    /// Write the rest of the stream and its end marker, returning the sink.
    pub fn finish(self) -> Result<W> {
        match self {
            StreamWriter::Single(w) => w.finish(),
            StreamWriter::Parallel(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StreamWriter::Single(w) => w.write(buf),
            StreamWriter::Parallel(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StreamWriter::Single(w) => w.flush(),
            StreamWriter::Parallel(w) => w.flush(),
        }
    }
}

// ── StreamReader ─────────────────────────────────────────────────────────────

/// Decoder that is parallel when the options ask for it.
pub enum StreamReader<R: Read> {
    Single(Lzma2Reader<R>),
    Parallel(ParallelReader<R>),
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R, options: &StreamOptions) -> Result<Self> {
        if options.parallel().is_some() {
            Ok(StreamReader::Parallel(ParallelReader::new(inner, options)?))
        } else {
            Ok(StreamReader::Single(Lzma2Reader::new(inner, options)))
        }
    }

    /// The underlying reader, positioned after the last chunk read.
    pub fn get_ref(&self) -> &R {
        match self {
            StreamReader::Single(r) => r.get_ref(),
            StreamReader::Parallel(r) => r.get_ref(),
        }
    }

    pub fn close_handle(&self) -> Option<CloseHandle> {
        match self {
            StreamReader::Single(_) => None,
            StreamReader::Parallel(r) => Some(r.close_handle()),
        }
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            StreamReader::Single(r) => r.read(buf),
            StreamReader::Parallel(r) => r.read(buf),
        }
    }
}
