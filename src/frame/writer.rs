//! Single-stream LZMA2 encoder.
//!
//! [`ChunkEncoder`] turns plaintext into chunks appended to a caller-owned
//! `Vec<u8>`; the parallel workers drive it directly over pooled buffers.
//! [`Lzma2Writer`] wraps it as a `std::io::Write` sink.

use std::io::{self, Write};

use super::chunk::{ChunkHeader, EncoderResets, ResetState, COMPRESSED_SIZE_MAX, END_MARKER};
use crate::error::{Lzma2Error, Result};
use crate::lzma::encoder::LzmaEncoder;
use crate::lzma::LzmaProps;
use crate::options::{Mode, StreamOptions};

/// Fixed overhead in KiB besides the engine: chunk buffers and headers.
const FIXED_MEMORY_USAGE: usize = 70;

/// Bytes kept in the window in front of the dictionary so that a whole raw
/// chunk can always be copied back out of it.
fn extra_size_before(dict_size: usize) -> usize {
    COMPRESSED_SIZE_MAX.saturating_sub(dict_size)
}

enum Engine {
    Lzma(Box<LzmaEncoder>),
    /// `Mode::Uncompressed`: bytes wait here until a raw chunk is full.
    Stored(Vec<u8>),
}

// ─────────────────────────────────────────────────────────────────────────────
// ChunkEncoder
// ─────────────────────────────────────────────────────────────────────────────

/// Chunk-level encoder state for one stream.
pub struct ChunkEncoder {
    engine: Engine,
    dict_size: usize,
    props: LzmaProps,
    resets: EncoderResets,
    /// Bytes accepted but not yet emitted in a chunk.
    pending_size: usize,
    finished: bool,
}

impl ChunkEncoder {
    /// Encoder for `options`, primed with its preset dictionary if any.
    pub fn new(options: &StreamOptions) -> Self {
        Self::with_preset(options, options.preset_dict().unwrap_or(&[]))
    }

    /// Encoder for `options` primed with `preset` instead of the options'
    /// preset dictionary.
    pub fn with_preset(options: &StreamOptions, preset: &[u8]) -> Self {
        let dict_size = options.dict_size();
        let engine = match options.mode() {
            Mode::Uncompressed => Engine::Stored(Vec::with_capacity(COMPRESSED_SIZE_MAX)),
            mode => Engine::Lzma(Box::new(LzmaEncoder::new(
                options.props(),
                mode,
                dict_size,
                extra_size_before(dict_size),
                options.nice_len(),
                options.match_finder(),
                options.depth_limit(),
                COMPRESSED_SIZE_MAX,
            ))),
        };
        let mut enc = ChunkEncoder {
            engine,
            dict_size,
            props: options.props(),
            resets: EncoderResets::new_stream(true),
            pending_size: 0,
            finished: false,
        };
        enc.prime(preset);
        enc
    }

    fn prime(&mut self, preset: &[u8]) {
        if let Engine::Lzma(lzma) = &mut self.engine {
            lzma.lz_mut().set_preset_dict(self.dict_size, preset);
        }
        self.resets = EncoderResets::new_stream(preset.is_empty());
    }

    /// Memory usage in KiB of an encoder built from `options`.
    pub fn memory_usage(options: &StreamOptions) -> usize {
        match options.mode() {
            Mode::Uncompressed => FIXED_MEMORY_USAGE,
            mode => {
                let dict_size = options.dict_size();
                FIXED_MEMORY_USAGE
                    + LzmaEncoder::memory_usage(
                        mode,
                        dict_size,
                        extra_size_before(dict_size),
                        options.match_finder(),
                    )
            }
        }
    }

    /// Start an independent stream, keeping the allocated engine. A non-empty
    /// `preset` becomes the shared history and the first chunk announces only
    /// a properties reset; otherwise it announces a dictionary reset.
    pub fn reset_with_preset(&mut self, preset: &[u8]) {
        match &mut self.engine {
            Engine::Lzma(lzma) => lzma.reset_stream(),
            Engine::Stored(buf) => buf.clear(),
        }
        self.pending_size = 0;
        self.finished = false;
        self.prime(preset);
    }

    pub fn props(&self) -> LzmaProps {
        self.props
    }

    /// Encode `data`, appending every chunk that fills up to `out`.
    pub fn write(&mut self, mut data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Lzma2Error::CancelledOrClosed);
        }
        match &mut self.engine {
            Engine::Stored(buf) => {
                while !data.is_empty() {
                    let n = (COMPRESSED_SIZE_MAX - buf.len()).min(data.len());
                    buf.extend_from_slice(&data[..n]);
                    data = &data[n..];
                    if buf.len() == COMPRESSED_SIZE_MAX {
                        Self::write_stored_chunk(buf, &mut self.resets, out);
                    }
                }
            }
            Engine::Lzma(lzma) => {
                while !data.is_empty() {
                    let used = lzma.lz_mut().fill_window(data);
                    data = &data[used..];
                    self.pending_size += used;
                    if lzma.encode_for_lzma2() {
                        self.pending_size -= Self::write_chunk(lzma, self.props, &mut self.resets, out);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_stored_chunk(buf: &mut Vec<u8>, resets: &mut EncoderResets, out: &mut Vec<u8>) {
        ChunkHeader::Uncompressed {
            dict_reset: resets.dict_reset_needed,
            size: buf.len(),
        }
        .write_to(out);
        out.extend_from_slice(buf);
        buf.clear();
        resets.after_uncompressed();
    }

    /// Emit the chunk the engine just closed; returns the plaintext size it
    /// covered.
    fn write_chunk(
        lzma: &mut LzmaEncoder,
        props: LzmaProps,
        resets: &mut EncoderResets,
        out: &mut Vec<u8>,
    ) -> usize {
        let compressed_size = lzma.rc_mut().finish();
        let mut uncompressed_size = lzma.uncompressed_size();
        debug_assert!(compressed_size > 0);
        debug_assert!(uncompressed_size > 0);

        if compressed_size + 2 < uncompressed_size {
            let reset = resets.compressed_reset();
            ChunkHeader::Compressed {
                reset,
                uncompressed_size,
                compressed_size,
                props: (reset >= ResetState::Props).then_some(props),
            }
            .write_to(out);
            out.extend_from_slice(lzma.rc().output());
            resets.after_compressed();
        } else {
            // Store: the coder state is discarded, so every byte the parser
            // had looked at belongs to this chunk.
            lzma.reset();
            uncompressed_size = lzma.uncompressed_size();
            let mut left = uncompressed_size;
            while left > 0 {
                let size = left.min(COMPRESSED_SIZE_MAX);
                ChunkHeader::Uncompressed {
                    dict_reset: resets.dict_reset_needed,
                    size,
                }
                .write_to(out);
                lzma.lz().copy_uncompressed(out, left, size);
                left -= size;
                resets.dict_reset_needed = false;
            }
            resets.after_uncompressed();
        }

        lzma.reset_uncompressed_size();
        lzma.rc_mut().reset();
        uncompressed_size
    }

    fn drain(&mut self, out: &mut Vec<u8>) {
        match &mut self.engine {
            Engine::Stored(buf) => {
                if !buf.is_empty() {
                    Self::write_stored_chunk(buf, &mut self.resets, out);
                }
            }
            Engine::Lzma(lzma) => {
                while self.pending_size > 0 {
                    lzma.encode_for_lzma2();
                    self.pending_size -= Self::write_chunk(lzma, self.props, &mut self.resets, out);
                }
            }
        }
    }

    /// Emit all buffered data as complete chunks. The stream stays open.
    pub fn flush(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Lzma2Error::CancelledOrClosed);
        }
        if let Engine::Lzma(lzma) = &mut self.engine {
            lzma.lz_mut().set_flushing();
        }
        self.drain(out);
        Ok(())
    }

    /// Emit all buffered data without the end marker. The encoder accepts no
    /// more data until [`reset_with_preset`](Self::reset_with_preset).
    pub fn finish_chunks(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Lzma2Error::CancelledOrClosed);
        }
        if let Engine::Lzma(lzma) = &mut self.engine {
            lzma.lz_mut().set_finishing();
        }
        self.drain(out);
        self.finished = true;
        Ok(())
    }

    /// Emit all buffered data followed by the end marker.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.finish_chunks(out)?;
        out.push(END_MARKER);
        Ok(())
    }

    /// Switch literal/position properties mid-stream. Pending data is
    /// flushed with the old properties first.
    pub fn set_props(&mut self, props: LzmaProps, out: &mut Vec<u8>) -> Result<()> {
        if !props.is_valid() {
            return Err(Lzma2Error::config(format!(
                "invalid properties lc={} lp={} pb={}",
                props.lc, props.lp, props.pb
            )));
        }
        self.flush(out)?;
        if let Engine::Lzma(lzma) = &mut self.engine {
            lzma.set_props(props);
        }
        self.props = props;
        self.resets.props_needed = true;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lzma2Writer
// ─────────────────────────────────────────────────────────────────────────────

/// `Write` adapter producing one LZMA2 stream on `inner`.
///
/// Dropping the writer without [`finish`](Self::finish) leaves the stream
/// without its end marker.
pub struct Lzma2Writer<W: Write> {
    inner: W,
    enc: ChunkEncoder,
    buf: Vec<u8>,
}

impl<W: Write> Lzma2Writer<W> {
    pub fn new(inner: W, options: &StreamOptions) -> Self {
        Lzma2Writer {
            inner,
            enc: ChunkEncoder::new(options),
            buf: Vec::with_capacity(COMPRESSED_SIZE_MAX + 16),
        }
    }

    fn drain_buf(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Change `lc`, `lp`, `pb` for the data written from now on.
    pub fn set_props(&mut self, props: LzmaProps) -> Result<()> {
        self.enc.set_props(props, &mut self.buf)?;
        self.drain_buf()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Write the remaining chunks and the end marker, flush and return the
    /// sink.
    pub fn finish(mut self) -> Result<W> {
        self.enc.finish(&mut self.buf)?;
        self.drain_buf()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Lzma2Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.enc.write(buf, &mut self.buf)?;
        self.drain_buf()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.enc.flush(&mut self.buf)?;
        self.drain_buf()?;
        self.inner.flush()
    }
}

/// Memory usage in KiB of a single-stream encoder for `options`.
pub fn memory_usage(options: &StreamOptions) -> usize {
    ChunkEncoder::memory_usage(options)
}
