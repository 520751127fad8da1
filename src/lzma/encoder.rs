//! LZMA symbol encoder.
//!
//! [`EncoderCore`] owns the range encoder, the window and the probability
//! model, and knows how to emit and price every kind of symbol. A parser
//! (fast or normal) decides which symbol comes next; it reports its choice
//! through `core.back`:
//!
//! * `BACK_LITERAL`: a literal byte,
//! * `0..REPS`: a repeated match using that rep distance,
//! * `REPS + d`: a new match at distance `d`.

use super::encoder_fast::FastParser;
use super::encoder_normal::NormalParser;
use super::lz_encoder::LzEncoder;
use super::range_enc::{self, bit_price, RangeEncoder};
use super::{
    dist_special_len, dist_state, CoderState, LengthModel, LzmaProps, State, ALIGN_BITS,
    ALIGN_MASK, ALIGN_SIZE, DIST_MODEL_END, DIST_MODEL_START, DIST_SLOTS, DIST_STATES,
    FULL_DISTANCES, LOW_SYMBOLS, MATCH_LEN_MAX, MATCH_LEN_MIN, MID_SYMBOLS, POS_STATES_MAX,
    REPS,
};
use crate::options::{MatchFinder, Mode};

/// A compressed chunk is closed once this many bytes were encoded into it.
pub(crate) const LZMA2_UNCOMPRESSED_LIMIT: usize = (2 << 20) - MATCH_LEN_MAX;
/// A compressed chunk is closed once its payload could exceed this size.
pub(crate) const LZMA2_COMPRESSED_LIMIT: usize = (64 << 10) - 26;

const DIST_PRICE_UPDATE_INTERVAL: i32 = FULL_DISTANCES as i32;
const ALIGN_PRICE_UPDATE_INTERVAL: i32 = ALIGN_SIZE as i32;
const LEN_PRICE_UPDATE_INTERVAL: i32 = 32;

pub(crate) const BACK_LITERAL: i32 = -1;

/// Distance slot of a zero-based match distance.
pub(crate) fn dist_slot(dist: u32) -> u32 {
    if dist <= DIST_MODEL_START as u32 {
        return dist;
    }
    let i = 31 - dist.leading_zeros();
    (i << 1) + ((dist >> (i - 1)) & 1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Length prices
// ─────────────────────────────────────────────────────────────────────────────

/// Cached prices of one length coder, refreshed per position state after
/// `LEN_PRICE_UPDATE_INTERVAL` symbols.
struct LengthPrices {
    counters: [i32; POS_STATES_MAX],
    prices: Vec<Vec<u32>>,
}

impl LengthPrices {
    fn new(nice_len: usize) -> Self {
        let len_symbols = (nice_len - MATCH_LEN_MIN + 1).max(LOW_SYMBOLS + MID_SYMBOLS);
        LengthPrices {
            counters: [0; POS_STATES_MAX],
            prices: vec![vec![0; len_symbols]; POS_STATES_MAX],
        }
    }

    fn reset(&mut self) {
        self.counters = [0; POS_STATES_MAX];
    }

    #[inline]
    fn price(&self, len: usize, pos_state: usize) -> u32 {
        self.prices[pos_state][len - MATCH_LEN_MIN]
    }

    fn update(&mut self, model: &LengthModel, pos_states: usize) {
        for pos_state in 0..pos_states {
            if self.counters[pos_state] <= 0 {
                self.counters[pos_state] = LEN_PRICE_UPDATE_INTERVAL;
                self.update_pos_state(model, pos_state);
            }
        }
    }

    fn update_pos_state(&mut self, model: &LengthModel, pos_state: usize) {
        let prices = &mut self.prices[pos_state];
        let mut choice0 = bit_price(model.choice[0], 0);
        let mut i = 0;
        while i < LOW_SYMBOLS {
            prices[i] = choice0 + range_enc::bit_tree_price(&model.low[pos_state], i as u32);
            i += 1;
        }
        choice0 = bit_price(model.choice[0], 1);
        let mut choice1 = bit_price(model.choice[1], 0);
        while i < LOW_SYMBOLS + MID_SYMBOLS {
            prices[i] = choice0
                + choice1
                + range_enc::bit_tree_price(&model.mid[pos_state], (i - LOW_SYMBOLS) as u32);
            i += 1;
        }
        choice1 = bit_price(model.choice[1], 1);
        while i < prices.len() {
            prices[i] = choice0
                + choice1
                + range_enc::bit_tree_price(&model.high, (i - LOW_SYMBOLS - MID_SYMBOLS) as u32);
            i += 1;
        }
    }
}

fn encode_len(
    rc: &mut RangeEncoder,
    model: &mut LengthModel,
    prices: &mut LengthPrices,
    len: usize,
    pos_state: usize,
) {
    let mut len = len - MATCH_LEN_MIN;
    if len < LOW_SYMBOLS {
        rc.encode_bit(&mut model.choice, 0, 0);
        rc.encode_bit_tree(&mut model.low[pos_state], len as u32);
    } else {
        rc.encode_bit(&mut model.choice, 0, 1);
        len -= LOW_SYMBOLS;
        if len < MID_SYMBOLS {
            rc.encode_bit(&mut model.choice, 1, 0);
            rc.encode_bit_tree(&mut model.mid[pos_state], len as u32);
        } else {
            rc.encode_bit(&mut model.choice, 1, 1);
            rc.encode_bit_tree(&mut model.high, (len - MID_SYMBOLS) as u32);
        }
    }
    prices.counters[pos_state] -= 1;
}

// ─────────────────────────────────────────────────────────────────────────────
// Literal prices
// ─────────────────────────────────────────────────────────────────────────────

fn literal_normal_price(probs: &[u16; 0x300], symbol: u32) -> u32 {
    let mut price = 0;
    let mut symbol = symbol | 0x100;
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

fn literal_matched_price(probs: &[u16; 0x300], symbol: u32, match_byte: u32) -> u32 {
    let mut price = 0;
    let mut offset = 0x100u32;
    let mut symbol = symbol | 0x100;
    let mut match_byte = match_byte;
    loop {
        match_byte <<= 1;
        let bit = (symbol >> 7) & 1;
        let index = offset + (match_byte & offset) + (symbol >> 8);
        price += bit_price(probs[index as usize], bit);
        symbol <<= 1;
        offset &= !(match_byte ^ symbol);
        if symbol >= 0x10000 {
            break;
        }
    }
    price
}

// ─────────────────────────────────────────────────────────────────────────────
// EncoderCore
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct EncoderCore {
    pub(crate) rc: RangeEncoder,
    pub(crate) lz: LzEncoder,
    pub(crate) coder: CoderState,
    match_len_prices: LengthPrices,
    rep_len_prices: LengthPrices,
    pub(crate) nice_len: usize,
    dist_price_count: i32,
    align_price_count: i32,
    dist_slot_prices_size: usize,
    dist_slot_prices: [[u32; DIST_SLOTS]; DIST_STATES],
    full_dist_prices: [[u32; FULL_DISTANCES]; DIST_STATES],
    align_prices: [u32; ALIGN_SIZE],
    /// Symbol chosen by the parser; see the module docs.
    pub(crate) back: i32,
    /// Bytes the parser has looked at beyond the last encoded symbol, minus 1.
    pub(crate) read_ahead: isize,
    uncompressed_size: usize,
}

impl EncoderCore {
    fn reset(&mut self) {
        self.coder.reset();
        self.match_len_prices.reset();
        self.rep_len_prices.reset();
        self.dist_price_count = 0;
        self.align_price_count = 0;
        self.uncompressed_size += (self.read_ahead + 1) as usize;
        self.read_ahead = -1;
    }

    #[inline]
    fn pos_states(&self) -> usize {
        self.coder.pos_mask as usize + 1
    }

    /// Move to the next byte and collect its matches into `lz.matches`.
    pub(crate) fn find_matches(&mut self) {
        self.read_ahead += 1;
        self.lz.find_matches();
    }

    pub(crate) fn skip(&mut self, len: usize) {
        self.read_ahead += len as isize;
        self.lz.skip(len);
    }

    /// Encode the first byte of a stream without a preset dictionary. It is
    /// always a literal and has no previous byte to use as context.
    fn encode_init(&mut self) -> bool {
        debug_assert_eq!(self.read_ahead, -1);
        if !self.lz.has_enough_data(0) {
            return false;
        }
        self.skip(1);
        let state = self.coder.state.get();
        self.rc.encode_bit(&mut self.coder.is_match[state], 0, 0);
        self.encode_literal_with(0);
        self.read_ahead -= 1;
        debug_assert_eq!(self.read_ahead, -1);
        self.uncompressed_size += 1;
        true
    }

    fn encode_literal(&mut self) {
        let prev = self.lz.byte_back(1 + self.read_ahead as usize);
        let pos = (self.lz.pos() - self.read_ahead) as u32;
        let index = self.coder.literal.subcoder_index(prev, pos);
        self.encode_literal_with(index);
    }

    fn encode_literal_with(&mut self, index: usize) {
        let read_ahead = self.read_ahead as usize;
        let mut symbol = self.lz.byte_back(read_ahead) | 0x100;
        if self.coder.state.is_literal() {
            let probs = &mut self.coder.literal.probs[index];
            loop {
                let bit = (symbol >> 7) & 1;
                self.rc.encode_bit(probs, (symbol >> 8) as usize, bit);
                symbol <<= 1;
                if symbol >= 0x10000 {
                    break;
                }
            }
        } else {
            let mut match_byte = self.lz.byte_back(self.coder.reps[0] as usize + 1 + read_ahead);
            let probs = &mut self.coder.literal.probs[index];
            let mut offset = 0x100u32;
            loop {
                match_byte <<= 1;
                let match_bit = match_byte & offset;
                let bit = (symbol >> 7) & 1;
                self.rc.encode_bit(probs, (offset + match_bit + (symbol >> 8)) as usize, bit);
                symbol <<= 1;
                offset &= !(match_byte ^ symbol);
                if symbol >= 0x10000 {
                    break;
                }
            }
        }
        self.coder.state = self.coder.state.after_literal();
    }

    /// Emit the symbol the parser chose (`len` bytes, `self.back`).
    fn encode_chosen(&mut self, len: usize) {
        debug_assert!(self.read_ahead >= 0);
        let pos_state = ((self.lz.pos() - self.read_ahead) as u32 & self.coder.pos_mask) as usize;
        let state = self.coder.state.get();
        if self.back == BACK_LITERAL {
            debug_assert_eq!(len, 1);
            self.rc.encode_bit(&mut self.coder.is_match[state], pos_state, 0);
            self.encode_literal();
        } else {
            self.rc.encode_bit(&mut self.coder.is_match[state], pos_state, 1);
            if (self.back as usize) < REPS {
                self.rc.encode_bit(&mut self.coder.is_rep, state, 1);
                self.encode_rep_match(self.back as usize, len, pos_state);
            } else {
                self.rc.encode_bit(&mut self.coder.is_rep, state, 0);
                self.encode_match(self.back as u32 - REPS as u32, len, pos_state);
            }
        }
        self.read_ahead -= len as isize;
        self.uncompressed_size += len;
    }

    fn encode_match(&mut self, dist: u32, len: usize, pos_state: usize) {
        self.coder.state = self.coder.state.after_match();
        encode_len(
            &mut self.rc,
            &mut self.coder.match_len,
            &mut self.match_len_prices,
            len,
            pos_state,
        );

        let slot = dist_slot(dist);
        self.rc
            .encode_bit_tree(&mut self.coder.dist_slots[dist_state(len)], slot);

        let slot = slot as usize;
        if slot >= DIST_MODEL_START {
            let footer_bits = (slot as u32 >> 1) - 1;
            let base = (2 | (slot as u32 & 1)) << footer_bits;
            let reduced = dist - base;
            if slot < DIST_MODEL_END {
                let probs = &mut self.coder.dist_special[slot - DIST_MODEL_START];
                self.rc
                    .encode_reverse_bit_tree(&mut probs[..dist_special_len(slot)], reduced);
            } else {
                self.rc
                    .encode_direct_bits(reduced >> ALIGN_BITS, footer_bits - ALIGN_BITS);
                self.rc
                    .encode_reverse_bit_tree(&mut self.coder.dist_align, reduced & ALIGN_MASK);
                self.align_price_count -= 1;
            }
        }

        let reps = &mut self.coder.reps;
        reps[3] = reps[2];
        reps[2] = reps[1];
        reps[1] = reps[0];
        reps[0] = dist;
        self.dist_price_count -= 1;
    }

    fn encode_rep_match(&mut self, rep: usize, len: usize, pos_state: usize) {
        let state = self.coder.state.get();
        if rep == 0 {
            self.rc.encode_bit(&mut self.coder.is_rep0, state, 0);
            self.rc.encode_bit(
                &mut self.coder.is_rep0_long[state],
                pos_state,
                (len != 1) as u32,
            );
        } else {
            let dist = self.coder.reps[rep];
            self.rc.encode_bit(&mut self.coder.is_rep0, state, 1);
            if rep == 1 {
                self.rc.encode_bit(&mut self.coder.is_rep1, state, 0);
            } else {
                self.rc.encode_bit(&mut self.coder.is_rep1, state, 1);
                self.rc
                    .encode_bit(&mut self.coder.is_rep2, state, rep as u32 - 2);
                if rep == 3 {
                    self.coder.reps[3] = self.coder.reps[2];
                }
                self.coder.reps[2] = self.coder.reps[1];
            }
            self.coder.reps[1] = self.coder.reps[0];
            self.coder.reps[0] = dist;
        }

        if len == 1 {
            self.coder.state = self.coder.state.after_short_rep();
        } else {
            encode_len(
                &mut self.rc,
                &mut self.coder.rep_len,
                &mut self.rep_len_prices,
                len,
                pos_state,
            );
            self.coder.state = self.coder.state.after_long_rep();
        }
    }

    // ── Prices ─────────────────────────────────────────────────────────────

    pub(crate) fn literal_price(
        &self,
        cur_byte: u32,
        match_byte: u32,
        prev_byte: u32,
        pos: u32,
        state: State,
    ) -> u32 {
        let pos_state = (pos & self.coder.pos_mask) as usize;
        let price = bit_price(self.coder.is_match[state.get()][pos_state], 0);
        let probs = &self.coder.literal.probs[self.coder.literal.subcoder_index(prev_byte, pos)];
        price
            + if state.is_literal() {
                literal_normal_price(probs, cur_byte)
            } else {
                literal_matched_price(probs, cur_byte, match_byte)
            }
    }

    pub(crate) fn any_match_price(&self, state: State, pos_state: usize) -> u32 {
        bit_price(self.coder.is_match[state.get()][pos_state], 1)
    }

    pub(crate) fn normal_match_price(&self, any_match_price: u32, state: State) -> u32 {
        any_match_price + bit_price(self.coder.is_rep[state.get()], 0)
    }

    pub(crate) fn any_rep_price(&self, any_match_price: u32, state: State) -> u32 {
        any_match_price + bit_price(self.coder.is_rep[state.get()], 1)
    }

    pub(crate) fn short_rep_price(&self, any_rep_price: u32, state: State, pos_state: usize) -> u32 {
        any_rep_price
            + bit_price(self.coder.is_rep0[state.get()], 0)
            + bit_price(self.coder.is_rep0_long[state.get()][pos_state], 0)
    }

    pub(crate) fn long_rep_price(
        &self,
        any_rep_price: u32,
        rep: usize,
        state: State,
        pos_state: usize,
    ) -> u32 {
        let s = state.get();
        let mut price = any_rep_price;
        if rep == 0 {
            price += bit_price(self.coder.is_rep0[s], 0)
                + bit_price(self.coder.is_rep0_long[s][pos_state], 1);
        } else {
            price += bit_price(self.coder.is_rep0[s], 1);
            if rep == 1 {
                price += bit_price(self.coder.is_rep1[s], 0);
            } else {
                price += bit_price(self.coder.is_rep1[s], 1)
                    + bit_price(self.coder.is_rep2[s], rep as u32 - 2);
            }
        }
        price
    }

    pub(crate) fn long_rep_and_len_price(
        &self,
        rep: usize,
        len: usize,
        state: State,
        pos_state: usize,
    ) -> u32 {
        let any_match = self.any_match_price(state, pos_state);
        let any_rep = self.any_rep_price(any_match, state);
        self.long_rep_price(any_rep, rep, state, pos_state) + self.rep_len_price(len, pos_state)
    }

    #[inline]
    pub(crate) fn rep_len_price(&self, len: usize, pos_state: usize) -> u32 {
        self.rep_len_prices.price(len, pos_state)
    }

    pub(crate) fn match_and_len_price(
        &self,
        normal_match_price: u32,
        dist: u32,
        len: usize,
        pos_state: usize,
    ) -> u32 {
        let mut price = normal_match_price + self.match_len_prices.price(len, pos_state);
        let ds = dist_state(len);
        if (dist as usize) < FULL_DISTANCES {
            price += self.full_dist_prices[ds][dist as usize];
        } else {
            let slot = dist_slot(dist) as usize;
            price += self.dist_slot_prices[ds][slot] + self.align_prices[(dist & ALIGN_MASK) as usize];
        }
        price
    }

    fn update_dist_prices(&mut self) {
        self.dist_price_count = DIST_PRICE_UPDATE_INTERVAL;

        for ds in 0..DIST_STATES {
            for slot in 0..self.dist_slot_prices_size {
                self.dist_slot_prices[ds][slot] =
                    range_enc::bit_tree_price(&self.coder.dist_slots[ds], slot as u32);
            }
            for slot in DIST_MODEL_END..self.dist_slot_prices_size {
                let count = (slot as u32 >> 1) - 1 - ALIGN_BITS;
                self.dist_slot_prices[ds][slot] += range_enc::direct_bits_price(count);
            }
            for dist in 0..DIST_MODEL_START {
                self.full_dist_prices[ds][dist] = self.dist_slot_prices[ds][dist];
            }
        }

        let mut dist = DIST_MODEL_START;
        for slot in DIST_MODEL_START..DIST_MODEL_END {
            let footer_bits = (slot as u32 >> 1) - 1;
            let base = ((2 | (slot as u32 & 1)) << footer_bits) as usize;
            let probs = &self.coder.dist_special[slot - DIST_MODEL_START][..dist_special_len(slot)];
            for _ in 0..probs.len() {
                let price = range_enc::reverse_bit_tree_price(probs, (dist - base) as u32);
                for ds in 0..DIST_STATES {
                    self.full_dist_prices[ds][dist] = self.dist_slot_prices[ds][slot] + price;
                }
                dist += 1;
            }
        }
        debug_assert_eq!(dist, FULL_DISTANCES);
    }

    fn update_align_prices(&mut self) {
        self.align_price_count = ALIGN_PRICE_UPDATE_INTERVAL;
        for i in 0..ALIGN_SIZE {
            self.align_prices[i] = range_enc::reverse_bit_tree_price(&self.coder.dist_align, i as u32);
        }
    }

    /// Refresh every stale price table before the normal parser uses them.
    pub(crate) fn update_prices(&mut self) {
        if self.dist_price_count <= 0 {
            self.update_dist_prices();
        }
        if self.align_price_count <= 0 {
            self.update_align_prices();
        }
        let pos_states = self.pos_states();
        self.match_len_prices.update(&self.coder.match_len, pos_states);
        self.rep_len_prices.update(&self.coder.rep_len, pos_states);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LzmaEncoder
// ─────────────────────────────────────────────────────────────────────────────

enum Parser {
    Fast(FastParser),
    Normal(Box<NormalParser>),
}

/// An LZMA encoder producing one LZMA2 chunk payload at a time.
pub(crate) struct LzmaEncoder {
    core: EncoderCore,
    parser: Parser,
}

impl LzmaEncoder {
    /// Memory usage in KiB of an encoder built with the same arguments.
    pub(crate) fn memory_usage(mode: Mode, dict_size: usize, extra_size_before: usize, mf: MatchFinder) -> usize {
        80 + match mode {
            Mode::Normal => NormalParser::memory_usage(dict_size, extra_size_before, mf),
            _ => FastParser::memory_usage(dict_size, extra_size_before, mf),
        }
    }

    /// Build an encoder. `Mode::Uncompressed` never reaches the engine; it is
    /// treated as fast.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        props: LzmaProps,
        mode: Mode,
        dict_size: usize,
        extra_size_before: usize,
        nice_len: usize,
        mf: MatchFinder,
        depth_limit: u32,
        rc_capacity: usize,
    ) -> Self {
        let (parser, lz) = match mode {
            Mode::Normal => (
                Parser::Normal(Box::new(NormalParser::new())),
                NormalParser::lz_encoder(dict_size, extra_size_before, nice_len, mf, depth_limit),
            ),
            _ => (
                Parser::Fast(FastParser),
                FastParser::lz_encoder(dict_size, extra_size_before, nice_len, mf, depth_limit),
            ),
        };
        let core = EncoderCore {
            rc: RangeEncoder::new(rc_capacity),
            lz,
            coder: CoderState::new(props.lc, props.lp, props.pb),
            match_len_prices: LengthPrices::new(nice_len),
            rep_len_prices: LengthPrices::new(nice_len),
            nice_len,
            dist_price_count: 0,
            align_price_count: 0,
            dist_slot_prices_size: dist_slot(dict_size as u32 - 1) as usize + 1,
            dist_slot_prices: [[0; DIST_SLOTS]; DIST_STATES],
            full_dist_prices: [[0; FULL_DISTANCES]; DIST_STATES],
            align_prices: [0; ALIGN_SIZE],
            back: 0,
            read_ahead: -1,
            uncompressed_size: 0,
        };
        LzmaEncoder { core, parser }
    }

    #[inline]
    pub(crate) fn lz(&self) -> &LzEncoder {
        &self.core.lz
    }

    #[inline]
    pub(crate) fn lz_mut(&mut self) -> &mut LzEncoder {
        &mut self.core.lz
    }

    #[inline]
    pub(crate) fn rc(&self) -> &RangeEncoder {
        &self.core.rc
    }

    #[inline]
    pub(crate) fn rc_mut(&mut self) -> &mut RangeEncoder {
        &mut self.core.rc
    }

    /// State reset: probabilities, reps and parser look-ahead. Bytes the
    /// parser had read ahead are counted as encoded so that the caller can
    /// store the whole chunk uncompressed.
    pub(crate) fn reset(&mut self) {
        if let Parser::Normal(p) = &mut self.parser {
            p.reset();
        }
        self.core.reset();
    }

    /// Forget everything, including the window, to start an independent
    /// stream with the same settings.
    pub(crate) fn reset_stream(&mut self) {
        self.core.lz.reset();
        self.core.rc.reset();
        self.reset();
        self.core.uncompressed_size = 0;
    }

    /// Switch to new literal/position properties. The probability model is
    /// rebuilt, so the next chunk must carry a properties reset.
    pub(crate) fn set_props(&mut self, props: LzmaProps) {
        self.core.coder = CoderState::new(props.lc, props.lp, props.pb);
        self.reset();
    }

    #[inline]
    pub(crate) fn uncompressed_size(&self) -> usize {
        self.core.uncompressed_size
    }

    #[inline]
    pub(crate) fn reset_uncompressed_size(&mut self) {
        self.core.uncompressed_size = 0;
    }

    /// Encode symbols until the chunk limits are reached (returns `true`) or
    /// the window runs out of data (returns `false`).
    pub(crate) fn encode_for_lzma2(&mut self) -> bool {
        if !self.core.lz.is_started() && !self.core.encode_init() {
            return false;
        }
        while self.core.uncompressed_size <= LZMA2_UNCOMPRESSED_LIMIT
            && self.core.rc.pending_size() <= LZMA2_COMPRESSED_LIMIT
        {
            if !self.encode_symbol() {
                return false;
            }
        }
        true
    }

    fn encode_symbol(&mut self) -> bool {
        if !self.core.lz.has_enough_data(self.core.read_ahead + 1) {
            return false;
        }
        let len = match &mut self.parser {
            Parser::Fast(p) => p.next_symbol(&mut self.core),
            Parser::Normal(p) => p.next_symbol(&mut self.core),
        };
        self.core.encode_chosen(len);
        true
    }
}
