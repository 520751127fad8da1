//! LZMA compression engine used by the chunk container.
//!
//! The engine is split the same way on both sides:
//!
//! * [`lz_encoder`] / [`lz_decoder`]: the sliding dictionary window;
//!   the encoder side also owns the [`hc4`] / [`bt4`] match finders.
//! * [`range_enc`] / [`range_dec`]: the binary range coder.
//! * [`encoder`] / [`decoder`]: the LZMA symbol layer (literals, matches,
//!   repeated matches) sharing the probability model in [`CoderState`].
//!
//! The container layer drives an encoder through
//! [`encoder::LzmaEncoder::encode_for_lzma2`], which stops whenever a chunk
//! reaches its uncompressed or compressed size limit.

pub(crate) mod bt4;
pub(crate) mod decoder;
pub(crate) mod encoder;
mod encoder_fast;
mod encoder_normal;
pub(crate) mod hash234;
pub(crate) mod hc4;
pub(crate) mod lz_decoder;
pub(crate) mod lz_encoder;
pub(crate) mod range_dec;
pub(crate) mod range_enc;

// ─────────────────────────────────────────────────────────────────────────────
// Range coder constants
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) const SHIFT_BITS: u32 = 8;
pub(crate) const TOP_MASK: u32 = 0xFF00_0000;
pub(crate) const BIT_MODEL_TOTAL_BITS: u32 = 11;
pub(crate) const BIT_MODEL_TOTAL: u32 = 1 << BIT_MODEL_TOTAL_BITS;
pub(crate) const PROB_INIT: u16 = (BIT_MODEL_TOTAL / 2) as u16;
pub(crate) const MOVE_BITS: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// LZMA model constants
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) const POS_STATES_MAX: usize = 1 << 4;

pub(crate) const MATCH_LEN_MIN: usize = 2;
pub(crate) const LOW_SYMBOLS: usize = 1 << 3;
pub(crate) const MID_SYMBOLS: usize = 1 << 3;
pub(crate) const HIGH_SYMBOLS: usize = 1 << 8;
pub(crate) const MATCH_LEN_MAX: usize =
    MATCH_LEN_MIN + LOW_SYMBOLS + MID_SYMBOLS + HIGH_SYMBOLS - 1;

pub(crate) const DIST_STATES: usize = 4;
pub(crate) const DIST_SLOTS: usize = 1 << 6;
pub(crate) const DIST_MODEL_START: usize = 4;
pub(crate) const DIST_MODEL_END: usize = 14;
pub(crate) const FULL_DISTANCES: usize = 1 << (DIST_MODEL_END / 2);

pub(crate) const ALIGN_BITS: u32 = 4;
pub(crate) const ALIGN_SIZE: usize = 1 << ALIGN_BITS;
pub(crate) const ALIGN_MASK: u32 = ALIGN_SIZE as u32 - 1;

pub(crate) const REPS: usize = 4;

/// Largest value `lc + lp` may take.
pub const LC_LP_MAX: u32 = 4;
/// Largest `pb`.
pub const PB_MAX: u32 = 4;

/// Literal context bits, literal position bits and position bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LzmaProps {
    pub lc: u32,
    pub lp: u32,
    pub pb: u32,
}

impl LzmaProps {
    /// `lc = 3, lp = 0, pb = 2`.
    pub const DEFAULT: LzmaProps = LzmaProps { lc: 3, lp: 0, pb: 2 };

    /// Largest valid properties byte.
    pub const BYTE_MAX: u8 = ((4 * 5 + 4) * 9 + 8) as u8;

    /// True when every field is in range and `lc + lp <= 4`.
    pub fn is_valid(&self) -> bool {
        self.lc <= LC_LP_MAX && self.lp <= LC_LP_MAX && self.lc + self.lp <= LC_LP_MAX && self.pb <= PB_MAX
    }

    /// Encoded properties byte `(pb * 5 + lp) * 9 + lc`.
    pub fn to_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Decode a properties byte; `None` when it is out of range or
    /// `lc + lp > 4`.
    pub fn from_byte(byte: u8) -> Option<LzmaProps> {
        if byte > Self::BYTE_MAX {
            return None;
        }
        let mut props = byte as u32;
        let pb = props / (9 * 5);
        props -= pb * 9 * 5;
        let lp = props / 9;
        let lc = props - lp * 9;
        let p = LzmaProps { lc, lp, pb };
        p.is_valid().then_some(p)
    }
}

impl Default for LzmaProps {
    fn default() -> Self {
        LzmaProps::DEFAULT
    }
}

/// Distance-slot context for a match of `len` bytes.
#[inline]
pub(crate) fn dist_state(len: usize) -> usize {
    if len < DIST_STATES + MATCH_LEN_MIN {
        len - MATCH_LEN_MIN
    } else {
        DIST_STATES - 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

const STATES: usize = 12;
const LIT_STATES: u8 = 7;

const LIT_LIT: u8 = 0;
const SHORTREP_LIT_LIT: u8 = 3;
const LIT_MATCH: u8 = 7;
const LIT_LONGREP: u8 = 8;
const LIT_SHORTREP: u8 = 9;
const NONLIT_MATCH: u8 = 10;
const NONLIT_REP: u8 = 11;

/// LZMA state: which kinds of symbols were coded most recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct State(u8);

impl State {
    #[inline]
    pub(crate) fn get(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn is_literal(self) -> bool {
        self.0 < LIT_STATES
    }

    #[inline]
    pub(crate) fn after_literal(self) -> State {
        State(if self.0 <= SHORTREP_LIT_LIT {
            LIT_LIT
        } else if self.0 <= LIT_SHORTREP {
            self.0 - 3
        } else {
            self.0 - 6
        })
    }

    #[inline]
    pub(crate) fn after_match(self) -> State {
        State(if self.0 < LIT_STATES { LIT_MATCH } else { NONLIT_MATCH })
    }

    #[inline]
    pub(crate) fn after_long_rep(self) -> State {
        State(if self.0 < LIT_STATES { LIT_LONGREP } else { NONLIT_REP })
    }

    #[inline]
    pub(crate) fn after_short_rep(self) -> State {
        State(if self.0 < LIT_STATES { LIT_SHORTREP } else { NONLIT_REP })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probability model shared by encoder and decoder
// ─────────────────────────────────────────────────────────────────────────────

/// Probabilities of one length coder (match lengths or rep lengths).
#[derive(Clone)]
pub(crate) struct LengthModel {
    pub(crate) choice: [u16; 2],
    pub(crate) low: [[u16; LOW_SYMBOLS]; POS_STATES_MAX],
    pub(crate) mid: [[u16; MID_SYMBOLS]; POS_STATES_MAX],
    pub(crate) high: [u16; HIGH_SYMBOLS],
}

impl LengthModel {
    pub(crate) fn new() -> Self {
        LengthModel {
            choice: [PROB_INIT; 2],
            low: [[PROB_INIT; LOW_SYMBOLS]; POS_STATES_MAX],
            mid: [[PROB_INIT; MID_SYMBOLS]; POS_STATES_MAX],
            high: [PROB_INIT; HIGH_SYMBOLS],
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = LengthModel::new();
    }
}

/// Literal probabilities: one 0x300-entry table per `(lc, lp)` context.
pub(crate) struct LiteralModel {
    lc: u32,
    literal_pos_mask: u32,
    pub(crate) probs: Vec<[u16; 0x300]>,
}

impl LiteralModel {
    pub(crate) fn new(lc: u32, lp: u32) -> Self {
        LiteralModel {
            lc,
            literal_pos_mask: (1 << lp) - 1,
            probs: vec![[PROB_INIT; 0x300]; 1 << (lc + lp)],
        }
    }

    pub(crate) fn reset(&mut self) {
        for p in &mut self.probs {
            p.fill(PROB_INIT);
        }
    }

    /// Index of the subcoder used after `prev_byte` at stream position `pos`.
    #[inline]
    pub(crate) fn subcoder_index(&self, prev_byte: u32, pos: u32) -> usize {
        let low = prev_byte >> (8 - self.lc);
        let high = (pos & self.literal_pos_mask) << self.lc;
        (low + high) as usize
    }
}

/// State, rep distances and all non-literal probabilities of an LZMA coder.
pub(crate) struct CoderState {
    pub(crate) pos_mask: u32,
    pub(crate) reps: [u32; REPS],
    pub(crate) state: State,
    pub(crate) is_match: [[u16; POS_STATES_MAX]; STATES],
    pub(crate) is_rep: [u16; STATES],
    pub(crate) is_rep0: [u16; STATES],
    pub(crate) is_rep1: [u16; STATES],
    pub(crate) is_rep2: [u16; STATES],
    pub(crate) is_rep0_long: [[u16; POS_STATES_MAX]; STATES],
    pub(crate) dist_slots: [[u16; DIST_SLOTS]; DIST_STATES],
    /// Reverse bit trees for slots `DIST_MODEL_START..DIST_MODEL_END`; only
    /// the first `dist_special_len(slot)` entries of each row are used.
    pub(crate) dist_special: [[u16; FULL_DISTANCES / 4]; DIST_MODEL_END - DIST_MODEL_START],
    pub(crate) dist_align: [u16; ALIGN_SIZE],
    pub(crate) match_len: LengthModel,
    pub(crate) rep_len: LengthModel,
    pub(crate) literal: LiteralModel,
}

/// Size of the reverse bit tree used for distance slot `slot`.
#[inline]
pub(crate) fn dist_special_len(slot: usize) -> usize {
    1 << ((slot >> 1) - 1)
}

impl CoderState {
    pub(crate) fn new(lc: u32, lp: u32, pb: u32) -> Self {
        CoderState {
            pos_mask: (1 << pb) - 1,
            reps: [0; REPS],
            state: State::default(),
            is_match: [[PROB_INIT; POS_STATES_MAX]; STATES],
            is_rep: [PROB_INIT; STATES],
            is_rep0: [PROB_INIT; STATES],
            is_rep1: [PROB_INIT; STATES],
            is_rep2: [PROB_INIT; STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; STATES],
            dist_slots: [[PROB_INIT; DIST_SLOTS]; DIST_STATES],
            dist_special: [[PROB_INIT; FULL_DISTANCES / 4]; DIST_MODEL_END - DIST_MODEL_START],
            dist_align: [PROB_INIT; ALIGN_SIZE],
            match_len: LengthModel::new(),
            rep_len: LengthModel::new(),
            literal: LiteralModel::new(lc, lp),
        }
    }

    /// Reset state, reps and every probability (an LZMA2 state reset).
    pub(crate) fn reset(&mut self) {
        self.reps = [0; REPS];
        self.state = State::default();
        for row in &mut self.is_match {
            row.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep0.fill(PROB_INIT);
        self.is_rep1.fill(PROB_INIT);
        self.is_rep2.fill(PROB_INIT);
        for row in &mut self.is_rep0_long {
            row.fill(PROB_INIT);
        }
        for row in &mut self.dist_slots {
            row.fill(PROB_INIT);
        }
        for row in &mut self.dist_special {
            row.fill(PROB_INIT);
        }
        self.dist_align.fill(PROB_INIT);
        self.match_len.reset();
        self.rep_len.reset();
        self.literal.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_len_max_is_273() {
        assert_eq!(MATCH_LEN_MAX, 273);
    }

    #[test]
    fn dist_special_rows_cover_full_distances() {
        let total: usize = (DIST_MODEL_START..DIST_MODEL_END).map(dist_special_len).sum();
        assert_eq!(total + DIST_MODEL_START, FULL_DISTANCES);
        assert!(dist_special_len(DIST_MODEL_END - 1) <= FULL_DISTANCES / 4);
    }

    #[test]
    fn state_transitions() {
        let s = State::default();
        assert!(s.is_literal());
        let m = s.after_match();
        assert_eq!(m.get(), 7);
        assert!(!m.is_literal());
        assert_eq!(m.after_literal().get(), 4);
        assert_eq!(m.after_match().get(), 10);
        assert_eq!(m.after_long_rep().get(), 11);
        assert_eq!(s.after_short_rep().get(), 9);
        assert_eq!(State(9).after_literal().get(), 6);
        assert_eq!(State(11).after_literal().get(), 5);
    }

    #[test]
    fn literal_subcoder_index() {
        let m = LiteralModel::new(3, 0);
        assert_eq!(m.subcoder_index(0xFF, 5), 7);
        let m = LiteralModel::new(0, 2);
        assert_eq!(m.subcoder_index(0xFF, 6), 2);
        assert_eq!(m.probs.len(), 4);
    }

    #[test]
    fn props_byte_round_trip_and_limits() {
        assert_eq!(LzmaProps::DEFAULT.to_byte(), 0x5D);
        assert_eq!(LzmaProps::from_byte(0x5D), Some(LzmaProps::DEFAULT));
        assert_eq!(LzmaProps::BYTE_MAX, 224);
        assert!(LzmaProps::from_byte(225).is_none());
        // lc = 4, lp = 1
        assert!(LzmaProps::from_byte(4 + 9).is_none());
        assert!(!LzmaProps { lc: 4, lp: 1, pb: 0 }.is_valid());
        assert!(LzmaProps { lc: 0, lp: 4, pb: 4 }.is_valid());
    }

    #[test]
    fn dist_state_saturates() {
        assert_eq!(dist_state(2), 0);
        assert_eq!(dist_state(5), 3);
        assert_eq!(dist_state(273), 3);
    }
}
