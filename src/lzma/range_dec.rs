//! Range decoder over the payload of one compressed chunk.

use super::{BIT_MODEL_TOTAL, BIT_MODEL_TOTAL_BITS, MOVE_BITS, SHIFT_BITS, TOP_MASK};
use crate::error::{Lzma2Error, Result};

/// Bytes consumed by the coder initialisation (`0x00` + 32-bit code).
pub(crate) const RC_INIT_SIZE: usize = 5;

/// Decoder for one chunk payload held in memory.
///
/// Reading past the end of the payload does not panic: it feeds zero bytes
/// and latches `overrun`, which makes `is_finished` report corruption once
/// the chunk has been decoded.
pub(crate) struct RangeDecoder {
    buf: Vec<u8>,
    pos: usize,
    range: u32,
    code: u32,
    overrun: bool,
}

impl RangeDecoder {
    pub(crate) fn new(capacity: usize) -> Self {
        RangeDecoder {
            buf: Vec::with_capacity(capacity),
            pos: 0,
            range: 0,
            code: 0,
            overrun: false,
        }
    }

    /// Buffer the caller fills with `len` payload bytes before `start`.
    pub(crate) fn input_buffer(&mut self, len: usize) -> &mut [u8] {
        self.buf.clear();
        self.buf.resize(len, 0);
        &mut self.buf[..]
    }

    /// Initialise the coder from the freshly filled input buffer.
    pub(crate) fn start(&mut self) -> Result<()> {
        if self.buf.len() < RC_INIT_SIZE {
            return Err(Lzma2Error::CorruptedInput("compressed chunk too small"));
        }
        if self.buf[0] != 0x00 {
            return Err(Lzma2Error::CorruptedInput("range coder first byte not zero"));
        }
        self.code = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        self.range = 0xFFFF_FFFF;
        self.pos = RC_INIT_SIZE;
        self.overrun = false;
        Ok(())
    }

    /// True when every payload byte was consumed and the coder ended cleanly.
    pub(crate) fn is_finished(&self) -> bool {
        !self.overrun && self.pos == self.buf.len() && self.code == 0
    }

    #[inline]
    pub(crate) fn normalize(&mut self) {
        if self.range & TOP_MASK == 0 {
            let b = match self.buf.get(self.pos) {
                Some(&b) => b,
                None => {
                    self.overrun = true;
                    0
                }
            };
            self.pos += 1;
            self.code = (self.code << SHIFT_BITS) | b as u32;
            self.range <<= SHIFT_BITS;
        }
    }

    #[inline]
    pub(crate) fn decode_bit(&mut self, probs: &mut [u16], index: usize) -> u32 {
        self.normalize();
        let prob = probs[index] as u32;
        let bound = (self.range >> BIT_MODEL_TOTAL_BITS) * prob;
        if self.code < bound {
            self.range = bound;
            probs[index] = (prob + ((BIT_MODEL_TOTAL - prob) >> MOVE_BITS)) as u16;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            probs[index] = (prob - (prob >> MOVE_BITS)) as u16;
            1
        }
    }

    pub(crate) fn decode_bit_tree(&mut self, probs: &mut [u16]) -> u32 {
        let len = probs.len() as u32;
        let mut symbol = 1u32;
        loop {
            symbol = (symbol << 1) | self.decode_bit(probs, symbol as usize);
            if symbol >= len {
                break;
            }
        }
        symbol - len
    }

    pub(crate) fn decode_reverse_bit_tree(&mut self, probs: &mut [u16]) -> u32 {
        let len = probs.len() as u32;
        let mut symbol = 1u32;
        let mut i = 0;
        let mut result = 0u32;
        loop {
            let bit = self.decode_bit(probs, symbol as usize);
            symbol = (symbol << 1) | bit;
            result |= bit << i;
            i += 1;
            if symbol >= len {
                break;
            }
        }
        result
    }

    pub(crate) fn decode_direct_bits(&mut self, mut count: u32) -> u32 {
        let mut result = 0u32;
        loop {
            self.normalize();
            self.range >>= 1;
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code = self.code.wrapping_sub(self.range & t.wrapping_sub(1));
            result = (result << 1) | (1 - t);
            count -= 1;
            if count == 0 {
                break;
            }
        }
        result
    }
}
