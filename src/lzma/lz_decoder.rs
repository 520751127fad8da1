//! Circular dictionary for the decoder.

use crate::error::{Lzma2Error, Result};

pub(crate) struct LzDecoder {
    buf: Vec<u8>,
    /// Start of bytes not yet handed out by `flush`.
    start: usize,
    pos: usize,
    /// Bytes of valid history, saturating at the buffer size.
    full: usize,
    limit: usize,
    pending_len: usize,
    pending_dist: usize,
}

/// Dictionary buffer size for `dict_size`: rounded up to a multiple of 16.
#[inline]
pub(crate) fn dict_buf_size(dict_size: usize) -> usize {
    (dict_size + 15) & !15
}

impl LzDecoder {
    /// New dictionary of `dict_size` bytes holding the last
    /// `min(preset.len(), dict_size)` bytes of `preset` as history.
    pub(crate) fn new(dict_size: usize, preset: &[u8]) -> Self {
        let mut lz = LzDecoder {
            buf: vec![0; dict_buf_size(dict_size)],
            start: 0,
            pos: 0,
            full: 0,
            limit: 0,
            pending_len: 0,
            pending_dist: 0,
        };
        if !preset.is_empty() {
            let n = preset.len().min(dict_size);
            lz.buf[..n].copy_from_slice(&preset[preset.len() - n..]);
            lz.pos = n;
            lz.full = n;
            lz.start = n;
        }
        lz
    }

    /// Dictionary reset. The last buffer byte is cleared so the first
    /// literal sees a zero previous byte.
    pub(crate) fn reset(&mut self) {
        self.start = 0;
        self.pos = 0;
        self.full = 0;
        self.limit = 0;
        self.pending_len = 0;
        let last = self.buf.len() - 1;
        self.buf[last] = 0;
    }

    /// Allow at most `out_max` more bytes before the next `flush`.
    pub(crate) fn set_limit(&mut self, out_max: usize) {
        self.limit = if self.buf.len() - self.pos <= out_max {
            self.buf.len()
        } else {
            self.pos + out_max
        };
    }

    #[inline]
    pub(crate) fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    #[inline]
    pub(crate) fn has_pending(&self) -> bool {
        self.pending_len > 0
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Byte `dist + 1` positions back (0 = the previous byte).
    #[inline]
    pub(crate) fn get_byte(&self, dist: usize) -> u8 {
        let offset = if dist >= self.pos {
            self.buf.len() + self.pos - dist - 1
        } else {
            self.pos - dist - 1
        };
        self.buf[offset]
    }

    #[inline]
    pub(crate) fn put_byte(&mut self, b: u8) {
        self.buf[self.pos] = b;
        self.pos += 1;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }

    /// Copy `len` bytes from `dist + 1` bytes back. Whatever does not fit
    /// under the limit stays pending for `repeat_pending`.
    pub(crate) fn repeat(&mut self, dist: usize, len: usize) -> Result<()> {
        if dist >= self.full {
            return Err(Lzma2Error::CorruptedInput("match distance beyond dictionary"));
        }

        let mut left = (self.limit - self.pos).min(len);
        self.pending_len = len - left;
        self.pending_dist = dist;

        let buf_size = self.buf.len();
        let back = if self.pos > dist {
            self.pos - dist - 1
        } else {
            // Source wraps around the end of the buffer.
            let back = buf_size + self.pos - dist - 1;
            let copy_size = (buf_size - back).min(left);
            self.buf.copy_within(back..back + copy_size, self.pos);
            self.pos += copy_size;
            left -= copy_size;
            if left == 0 {
                return Ok(());
            }
            0
        };

        while left > 0 {
            let copy_size = left.min(self.pos - back);
            self.buf.copy_within(back..back + copy_size, self.pos);
            self.pos += copy_size;
            left -= copy_size;
        }

        if self.full < self.pos {
            self.full = self.pos;
        }
        Ok(())
    }

    pub(crate) fn repeat_pending(&mut self) -> Result<()> {
        if self.pending_len > 0 {
            self.repeat(self.pending_dist, self.pending_len)?;
        }
        Ok(())
    }

    /// Read up to `len` raw bytes (bounded by the space before the buffer
    /// wraps) from `input` into the dictionary; returns the count.
    pub(crate) fn copy_uncompressed(&mut self, input: &[u8], len: usize) -> usize {
        let copy_size = (self.buf.len() - self.pos).min(len).min(input.len());
        self.buf[self.pos..self.pos + copy_size].copy_from_slice(&input[..copy_size]);
        self.pos += copy_size;
        if self.full < self.pos {
            self.full = self.pos;
        }
        copy_size
    }

    /// Hand out the bytes produced since the last flush.
    pub(crate) fn flush(&mut self, out: &mut [u8]) -> usize {
        let copy_size = self.pos - self.start;
        out[..copy_size].copy_from_slice(&self.buf[self.start..self.pos]);
        if self.pos == self.buf.len() {
            self.pos = 0;
        }
        self.start = self.pos;
        copy_size
    }
}
