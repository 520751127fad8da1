//! LZMA symbol decoder.

use super::lz_decoder::LzDecoder;
use super::range_dec::RangeDecoder;
use super::{
    dist_special_len, dist_state, CoderState, LengthModel, LzmaProps, ALIGN_BITS,
    DIST_MODEL_END, DIST_MODEL_START, LOW_SYMBOLS, MATCH_LEN_MIN, MID_SYMBOLS,
};
use crate::error::Result;

pub(crate) struct LzmaDecoder {
    coder: CoderState,
}

fn decode_len(rc: &mut RangeDecoder, model: &mut LengthModel, pos_state: usize) -> usize {
    if rc.decode_bit(&mut model.choice, 0) == 0 {
        return rc.decode_bit_tree(&mut model.low[pos_state]) as usize + MATCH_LEN_MIN;
    }
    if rc.decode_bit(&mut model.choice, 1) == 0 {
        return rc.decode_bit_tree(&mut model.mid[pos_state]) as usize + MATCH_LEN_MIN + LOW_SYMBOLS;
    }
    rc.decode_bit_tree(&mut model.high) as usize + MATCH_LEN_MIN + LOW_SYMBOLS + MID_SYMBOLS
}

impl LzmaDecoder {
    pub(crate) fn new(props: LzmaProps) -> Self {
        LzmaDecoder {
            coder: CoderState::new(props.lc, props.lp, props.pb),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.coder.reset();
    }

    /// Decode symbols until the dictionary limit is reached.
    pub(crate) fn decode(&mut self, lz: &mut LzDecoder, rc: &mut RangeDecoder) -> Result<()> {
        lz.repeat_pending()?;

        while lz.has_space() {
            let pos_state = (lz.pos() as u32 & self.coder.pos_mask) as usize;
            let state = self.coder.state.get();

            if rc.decode_bit(&mut self.coder.is_match[state], pos_state) == 0 {
                self.decode_literal(lz, rc);
            } else {
                let len = if rc.decode_bit(&mut self.coder.is_rep, state) == 0 {
                    self.decode_match(rc, pos_state)
                } else {
                    self.decode_rep_match(rc, pos_state)
                };
                lz.repeat(self.coder.reps[0] as usize, len)?;
            }
        }

        rc.normalize();
        Ok(())
    }

    fn decode_literal(&mut self, lz: &mut LzDecoder, rc: &mut RangeDecoder) {
        let index = self
            .coder
            .literal
            .subcoder_index(lz.get_byte(0) as u32, lz.pos() as u32);
        let literal_state = self.coder.state.is_literal();
        let match_byte = if literal_state {
            0
        } else {
            lz.get_byte(self.coder.reps[0] as usize) as u32
        };
        let probs = &mut self.coder.literal.probs[index];

        let mut symbol = 1u32;
        if literal_state {
            loop {
                symbol = (symbol << 1) | rc.decode_bit(probs, symbol as usize);
                if symbol >= 0x100 {
                    break;
                }
            }
        } else {
            let mut match_byte = match_byte;
            let mut offset = 0x100u32;
            loop {
                match_byte <<= 1;
                let match_bit = match_byte & offset;
                let bit = rc.decode_bit(probs, (offset + match_bit + symbol) as usize);
                symbol = (symbol << 1) | bit;
                offset &= 0u32.wrapping_sub(bit) ^ !match_bit;
                if symbol >= 0x100 {
                    break;
                }
            }
        }

        lz.put_byte(symbol as u8);
        self.coder.state = self.coder.state.after_literal();
    }

    fn decode_match(&mut self, rc: &mut RangeDecoder, pos_state: usize) -> usize {
        let c = &mut self.coder;
        c.state = c.state.after_match();
        c.reps[3] = c.reps[2];
        c.reps[2] = c.reps[1];
        c.reps[1] = c.reps[0];

        let len = decode_len(rc, &mut c.match_len, pos_state);
        let slot = rc.decode_bit_tree(&mut c.dist_slots[dist_state(len)]) as usize;

        if slot < DIST_MODEL_START {
            c.reps[0] = slot as u32;
        } else {
            let limit = (slot as u32 >> 1) - 1;
            let mut dist = (2 | (slot as u32 & 1)) << limit;
            if slot < DIST_MODEL_END {
                let probs = &mut c.dist_special[slot - DIST_MODEL_START];
                dist |= rc.decode_reverse_bit_tree(&mut probs[..dist_special_len(slot)]);
            } else {
                dist |= rc.decode_direct_bits(limit - ALIGN_BITS) << ALIGN_BITS;
                dist |= rc.decode_reverse_bit_tree(&mut c.dist_align);
            }
            c.reps[0] = dist;
        }

        len
    }

    fn decode_rep_match(&mut self, rc: &mut RangeDecoder, pos_state: usize) -> usize {
        let c = &mut self.coder;
        let state = c.state.get();

        if rc.decode_bit(&mut c.is_rep0, state) == 0 {
            if rc.decode_bit(&mut c.is_rep0_long[state], pos_state) == 0 {
                c.state = c.state.after_short_rep();
                return 1;
            }
        } else {
            let tmp;
            if rc.decode_bit(&mut c.is_rep1, state) == 0 {
                tmp = c.reps[1];
            } else {
                if rc.decode_bit(&mut c.is_rep2, state) == 0 {
                    tmp = c.reps[2];
                } else {
                    tmp = c.reps[3];
                    c.reps[3] = c.reps[2];
                }
                c.reps[2] = c.reps[1];
            }
            c.reps[1] = c.reps[0];
            c.reps[0] = tmp;
        }

        c.state = c.state.after_long_rep();
        decode_len(rc, &mut c.rep_len, pos_state)
    }
}
