//! Range encoder writing into an in-memory chunk buffer, plus the bit price
//! tables used by the normal-mode parser.

use super::{BIT_MODEL_TOTAL, BIT_MODEL_TOTAL_BITS, MOVE_BITS, SHIFT_BITS, TOP_MASK};

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

const MOVE_REDUCING_BITS: u32 = 4;
const BIT_PRICE_SHIFT_BITS: u32 = 4;
const PRICE_TABLE_SIZE: usize = (BIT_MODEL_TOTAL >> MOVE_REDUCING_BITS) as usize;

const fn build_prices() -> [u32; PRICE_TABLE_SIZE] {
    let mut prices = [0u32; PRICE_TABLE_SIZE];
    let step = 1u32 << MOVE_REDUCING_BITS;
    let mut i = step / 2;
    while i < BIT_MODEL_TOTAL {
        let mut w = i;
        let mut bit_count = 0u32;
        let mut j = 0;
        while j < BIT_PRICE_SHIFT_BITS {
            w *= w;
            bit_count <<= 1;
            while w & 0xFFFF_0000 != 0 {
                w >>= 1;
                bit_count += 1;
            }
            j += 1;
        }
        prices[(i >> MOVE_REDUCING_BITS) as usize] =
            (BIT_MODEL_TOTAL_BITS << BIT_PRICE_SHIFT_BITS) - 15 - bit_count;
        i += step;
    }
    prices
}

static PRICES: [u32; PRICE_TABLE_SIZE] = build_prices();

/// Price (in 1/16 bit units) of coding `bit` with probability `prob`.
#[inline]
pub(crate) fn bit_price(prob: u16, bit: u32) -> u32 {
    let mask = 0u32.wrapping_sub(bit) & (BIT_MODEL_TOTAL - 1);
    PRICES[((prob as u32 ^ mask) >> MOVE_REDUCING_BITS) as usize]
}

pub(crate) fn bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let mut price = 0;
    let mut symbol = symbol | probs.len() as u32;
    loop {
        let bit = symbol & 1;
        symbol >>= 1;
        price += bit_price(probs[symbol as usize], bit);
        if symbol == 1 {
            break;
        }
    }
    price
}

pub(crate) fn reverse_bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let mut price = 0;
    let mut index = 1usize;
    let mut symbol = symbol | probs.len() as u32;
    loop {
        let bit = symbol & 1;
        symbol >>= 1;
        price += bit_price(probs[index], bit);
        index = (index << 1) | bit as usize;
        if symbol == 1 {
            break;
        }
    }
    price
}

#[inline]
pub(crate) fn direct_bits_price(count: u32) -> u32 {
    count << BIT_PRICE_SHIFT_BITS
}

// ---------------------------------------------------------------------------
// RangeEncoder
// ---------------------------------------------------------------------------

/// Range encoder for one compressed chunk at a time.
///
/// The output buffer is sized for the largest chunk payload; the LZMA encoder
/// stops well before it can overflow (see `LZMA2_COMPRESSED_LIMIT`).
pub(crate) struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u32,
    buf: Vec<u8>,
}

impl RangeEncoder {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut rc = RangeEncoder {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0,
            cache_size: 1,
            buf: Vec::with_capacity(capacity),
        };
        rc.reset();
        rc
    }

    pub(crate) fn reset(&mut self) {
        self.low = 0;
        self.range = 0xFFFF_FFFF;
        self.cache = 0;
        self.cache_size = 1;
        self.buf.clear();
    }

    /// Bytes that `finish` would produce if called now.
    #[inline]
    pub(crate) fn pending_size(&self) -> usize {
        self.buf.len() + self.cache_size as usize + 5 - 1
    }

    /// Flush the coder state; returns the payload size.
    pub(crate) fn finish(&mut self) -> usize {
        for _ in 0..5 {
            self.shift_low();
        }
        self.buf.len()
    }

    /// Finished payload bytes.
    #[inline]
    pub(crate) fn output(&self) -> &[u8] {
        &self.buf
    }

    fn shift_low(&mut self) {
        let low_hi = (self.low >> 32) as u8;
        if low_hi != 0 || self.low < 0xFF00_0000 {
            let mut temp = self.cache;
            loop {
                self.buf.push(temp.wrapping_add(low_hi));
                temp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    #[inline]
    pub(crate) fn encode_bit(&mut self, probs: &mut [u16], index: usize, bit: u32) {
        let prob = probs[index] as u32;
        let bound = (self.range >> BIT_MODEL_TOTAL_BITS) * prob;
        if bit == 0 {
            self.range = bound;
            probs[index] = (prob + ((BIT_MODEL_TOTAL - prob) >> MOVE_BITS)) as u16;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            probs[index] = (prob - (prob >> MOVE_BITS)) as u16;
        }
        if self.range & TOP_MASK == 0 {
            self.range <<= SHIFT_BITS;
            self.shift_low();
        }
    }

    pub(crate) fn encode_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let mut index = 1usize;
        let mut mask = probs.len() as u32;
        loop {
            mask >>= 1;
            let bit = symbol & mask;
            self.encode_bit(probs, index, (bit != 0) as u32);
            index <<= 1;
            if bit != 0 {
                index |= 1;
            }
            if mask == 1 {
                break;
            }
        }
    }

    pub(crate) fn encode_reverse_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let mut index = 1usize;
        let mut symbol = symbol | probs.len() as u32;
        loop {
            let bit = symbol & 1;
            symbol >>= 1;
            self.encode_bit(probs, index, bit);
            index = (index << 1) | bit as usize;
            if symbol == 1 {
                break;
            }
        }
    }

    pub(crate) fn encode_direct_bits(&mut self, value: u32, mut count: u32) {
        loop {
            self.range >>= 1;
            count -= 1;
            let bit = (value >> count) & 1;
            self.low += (self.range & 0u32.wrapping_sub(bit)) as u64;
            if self.range & TOP_MASK == 0 {
                self.range <<= SHIFT_BITS;
                self.shift_low();
            }
            if count == 0 {
                break;
            }
        }
    }
}
