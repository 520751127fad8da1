//! Single-stream LZMA2 decoder exposed as `std::io::Read`.

use std::io::{self, Read};

use super::chunk::{ChunkHeader, DecoderResets, COMPRESSED_SIZE_MAX};
use crate::error::{Lzma2Error, Result};
use crate::lzma::decoder::LzmaDecoder;
use crate::lzma::lz_decoder::{dict_buf_size, LzDecoder};
use crate::lzma::range_dec::RangeDecoder;
use crate::options::StreamOptions;

/// Memory usage in KiB of a decoder for `dict_size`.
pub fn memory_usage(dict_size: usize) -> usize {
    40 + COMPRESSED_SIZE_MAX / 1024 + dict_buf_size(dict_size) / 1024
}

/// Decoder for one LZMA2 stream read from `inner`.
///
/// `read` returns `Ok(0)` once the end marker has been consumed; bytes after
/// it stay unread in `inner`. Corruption is reported as
/// `io::ErrorKind::InvalidData` wrapping [`Lzma2Error::CorruptedInput`], and
/// every later call fails the same way.
pub struct Lzma2Reader<R: Read> {
    inner: R,
    lz: LzDecoder,
    rc: RangeDecoder,
    lzma: Option<LzmaDecoder>,
    resets: DecoderResets,
    /// Plaintext bytes left in the current chunk.
    chunk_left: usize,
    is_lzma_chunk: bool,
    /// Payload of the current raw chunk and the read position in it.
    raw: Vec<u8>,
    raw_pos: usize,
    end_reached: bool,
    error: Option<Lzma2Error>,
}

impl<R: Read> Lzma2Reader<R> {
    /// Decoder using the dictionary size and preset dictionary of `options`.
    pub fn new(inner: R, options: &StreamOptions) -> Self {
        Self::with_dict(inner, options.dict_size(), options.preset_dict().unwrap_or(&[]))
    }

    /// Decoder with an explicit dictionary size and preset dictionary. A
    /// non-empty preset lets the stream start without a dictionary reset.
    pub fn with_dict(inner: R, dict_size: usize, preset: &[u8]) -> Self {
        Lzma2Reader {
            inner,
            lz: LzDecoder::new(dict_size, preset),
            rc: RangeDecoder::new(COMPRESSED_SIZE_MAX),
            lzma: None,
            resets: DecoderResets::new(!preset.is_empty()),
            chunk_left: 0,
            is_lzma_chunk: false,
            raw: Vec::new(),
            raw_pos: 0,
            end_reached: false,
            error: None,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Give back the underlying reader, positioned after the last consumed
    /// chunk.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// True once the end marker has been read.
    pub fn is_finished(&self) -> bool {
        self.end_reached
    }

    fn next_chunk(&mut self) -> Result<()> {
        let header = ChunkHeader::read_from(&mut self.inner)?;
        let action = self.resets.check(&header)?;
        if action.reset_dict {
            self.lz.reset();
        }

        match header {
            ChunkHeader::End => {
                self.end_reached = true;
            }
            ChunkHeader::Uncompressed { size, .. } => {
                self.raw.clear();
                self.raw.resize(size, 0);
                self.inner.read_exact(&mut self.raw)?;
                self.raw_pos = 0;
                self.is_lzma_chunk = false;
                self.chunk_left = size;
            }
            ChunkHeader::Compressed {
                uncompressed_size,
                compressed_size,
                ..
            } => {
                if let Some(props) = action.new_props {
                    self.lzma = Some(LzmaDecoder::new(props));
                } else if action.reset_state {
                    if let Some(lzma) = &mut self.lzma {
                        lzma.reset();
                    }
                }
                self.inner.read_exact(self.rc.input_buffer(compressed_size))?;
                self.rc.start()?;
                self.is_lzma_chunk = true;
                self.chunk_left = uncompressed_size;
            }
        }
        Ok(())
    }

    fn read_inner(&mut self, mut buf: &mut [u8]) -> Result<usize> {
        let mut size = 0;
        while !buf.is_empty() {
            if self.chunk_left == 0 {
                self.next_chunk()?;
                if self.end_reached {
                    break;
                }
            }

            let copy_max = self.chunk_left.min(buf.len());
            if self.is_lzma_chunk {
                self.lz.set_limit(copy_max);
                match &mut self.lzma {
                    Some(lzma) => lzma.decode(&mut self.lz, &mut self.rc)?,
                    None => return Err(Lzma2Error::CorruptedInput("compressed chunk without properties")),
                }
            } else {
                let n = self.lz.copy_uncompressed(&self.raw[self.raw_pos..], copy_max);
                self.raw_pos += n;
            }

            let copied = self.lz.flush(buf);
            buf = &mut buf[copied..];
            size += copied;
            self.chunk_left -= copied;

            if self.chunk_left == 0
                && self.is_lzma_chunk
                && (!self.rc.is_finished() || self.lz.has_pending())
            {
                return Err(Lzma2Error::CorruptedInput("compressed chunk size mismatch"));
            }
        }
        Ok(size)
    }
}

impl<R: Read> Read for Lzma2Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(e) = &self.error {
            return Err(e.clone().into());
        }
        if buf.is_empty() || self.end_reached {
            return Ok(0);
        }
        match self.read_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.error = Some(e.clone());
                Err(e.into())
            }
        }
    }
}
