//! Price-based parser: evaluates symbol sequences over up to `OPTS` bytes
//! and keeps the cheapest path.

use super::encoder::{EncoderCore, BACK_LITERAL};
use super::lz_encoder::LzEncoder;
use super::{State, MATCH_LEN_MAX, MATCH_LEN_MIN, REPS};
use crate::options::MatchFinder;

const OPTS: usize = 4096;
const EXTRA_SIZE_BEFORE: usize = OPTS;
const EXTRA_SIZE_AFTER: usize = OPTS;

const INFINITY_PRICE: u32 = 1 << 30;

#[derive(Clone, Copy)]
struct Optimum {
    state: State,
    reps: [u32; REPS],
    price: u32,
    opt_prev: usize,
    back_prev: i32,
    prev1_is_literal: bool,
    has_prev2: bool,
    opt_prev2: usize,
    back_prev2: i32,
}

impl Optimum {
    const EMPTY: Optimum = Optimum {
        state: State(0),
        reps: [0; REPS],
        price: INFINITY_PRICE,
        opt_prev: 0,
        back_prev: 0,
        prev1_is_literal: false,
        has_prev2: false,
        opt_prev2: 0,
        back_prev2: 0,
    };

    #[inline]
    fn reset(&mut self) {
        self.price = INFINITY_PRICE;
    }

    /// Reached from `opt_cur` with one symbol.
    #[inline]
    fn set1(&mut self, price: u32, opt_cur: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur;
        self.back_prev = back;
        self.prev1_is_literal = false;
    }

    /// Reached from `opt_cur` with a literal followed by a rep match.
    #[inline]
    fn set2(&mut self, price: u32, opt_cur: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur + 1;
        self.back_prev = back;
        self.prev1_is_literal = true;
        self.has_prev2 = false;
    }

    /// Reached from `opt_cur` with a match (`back2`, `len2` bytes), a
    /// literal and a rep match.
    #[inline]
    fn set3(&mut self, price: u32, opt_cur: usize, back2: i32, len2: usize, back: i32) {
        self.price = price;
        self.opt_prev = opt_cur + len2 + 1;
        self.back_prev = back;
        self.prev1_is_literal = true;
        self.has_prev2 = true;
        self.opt_prev2 = opt_cur;
        self.back_prev2 = back2;
    }
}

pub(crate) struct NormalParser {
    opts: Vec<Optimum>,
    opt_cur: usize,
    opt_end: usize,
    rep_lens: [usize; REPS],
}

impl NormalParser {
    pub(crate) fn memory_usage(dict_size: usize, extra_size_before: usize, mf: MatchFinder) -> usize {
        LzEncoder::memory_usage(
            dict_size,
            extra_size_before.max(EXTRA_SIZE_BEFORE),
            EXTRA_SIZE_AFTER,
            MATCH_LEN_MAX,
            mf,
        ) + OPTS * 64 / 1024
    }

    pub(crate) fn lz_encoder(
        dict_size: usize,
        extra_size_before: usize,
        nice_len: usize,
        mf: MatchFinder,
        depth_limit: u32,
    ) -> LzEncoder {
        LzEncoder::new(
            dict_size,
            extra_size_before.max(EXTRA_SIZE_BEFORE),
            EXTRA_SIZE_AFTER,
            nice_len,
            MATCH_LEN_MAX,
            mf,
            depth_limit,
        )
    }

    pub(crate) fn new() -> Self {
        NormalParser {
            opts: vec![Optimum::EMPTY; OPTS],
            opt_cur: 0,
            opt_end: 0,
            rep_lens: [0; REPS],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.opt_cur = 0;
        self.opt_end = 0;
    }

    /// Turn the backward links of the cheapest path ending at `opt_cur` into
    /// forward links, then return the first symbol.
    fn convert_opts(&mut self, enc: &mut EncoderCore) -> usize {
        let opts = &mut self.opts;
        self.opt_end = self.opt_cur;
        let mut opt_cur = self.opt_cur;
        let mut opt_prev = opts[opt_cur].opt_prev;

        loop {
            let opt = opts[opt_cur];

            if opt.prev1_is_literal {
                opts[opt_prev].opt_prev = opt_cur;
                opts[opt_prev].back_prev = BACK_LITERAL;
                opt_cur = opt_prev;
                opt_prev -= 1;

                if opt.has_prev2 {
                    opts[opt_prev].opt_prev = opt_prev + 1;
                    opts[opt_prev].back_prev = opt.back_prev2;
                    opt_cur = opt_prev;
                    opt_prev = opt.opt_prev2;
                }
            }

            let temp = opts[opt_prev].opt_prev;
            opts[opt_prev].opt_prev = opt_cur;
            opt_cur = opt_prev;
            opt_prev = temp;

            if opt_cur == 0 {
                break;
            }
        }

        self.opt_cur = opts[0].opt_prev;
        enc.back = opts[self.opt_cur].back_prev;
        self.opt_cur
    }

    pub(crate) fn next_symbol(&mut self, enc: &mut EncoderCore) -> usize {
        // Symbols left over from the previous optimisation come first.
        if self.opt_cur < self.opt_end {
            let len = self.opts[self.opt_cur].opt_prev - self.opt_cur;
            self.opt_cur = self.opts[self.opt_cur].opt_prev;
            enc.back = self.opts[self.opt_cur].back_prev;
            return len;
        }

        debug_assert_eq!(self.opt_cur, self.opt_end);
        self.opt_cur = 0;
        self.opt_end = 0;
        enc.back = BACK_LITERAL;

        if enc.read_ahead == -1 {
            enc.find_matches();
        }

        let avail = enc.lz.avail().min(MATCH_LEN_MAX);
        if avail < MATCH_LEN_MIN {
            return 1;
        }

        let nice_len = enc.nice_len;

        let mut rep_best = 0;
        for rep in 0..REPS {
            let len = enc.lz.match_len(enc.coder.reps[rep], avail);
            self.rep_lens[rep] = if len < MATCH_LEN_MIN { 0 } else { len };
            if self.rep_lens[rep] > self.rep_lens[rep_best] {
                rep_best = rep;
            }
        }

        if self.rep_lens[rep_best] >= nice_len {
            enc.back = rep_best as i32;
            enc.skip(self.rep_lens[rep_best] - 1);
            return self.rep_lens[rep_best];
        }

        let mut main_len = 0;
        let mut main_dist = 0;
        {
            let m = &enc.lz.matches;
            if m.count > 0 {
                main_len = m.len[m.count - 1];
                main_dist = m.dist[m.count - 1];
            }
        }
        if main_len >= nice_len {
            enc.back = (main_dist + REPS as u32) as i32;
            enc.skip(main_len - 1);
            return main_len;
        }

        let cur_byte = enc.lz.byte_back(0);
        let match_byte = enc.lz.byte_back(enc.coder.reps[0] as usize + 1);

        if main_len < MATCH_LEN_MIN && cur_byte != match_byte && self.rep_lens[rep_best] < MATCH_LEN_MIN {
            return 1;
        }

        let mut pos = enc.lz.pos() as u32;
        let mut pos_state = (pos & enc.coder.pos_mask) as usize;
        let state = enc.coder.state;

        {
            let prev_byte = enc.lz.byte_back(1);
            let literal_price = enc.literal_price(cur_byte, match_byte, prev_byte, pos, state);
            self.opts[1].set1(literal_price, 0, BACK_LITERAL);
        }

        let mut any_match_price = enc.any_match_price(state, pos_state);
        let mut any_rep_price = enc.any_rep_price(any_match_price, state);

        if match_byte == cur_byte {
            let short_rep_price = enc.short_rep_price(any_rep_price, state, pos_state);
            if short_rep_price < self.opts[1].price {
                self.opts[1].set1(short_rep_price, 0, 0);
            }
        }

        self.opt_end = main_len.max(self.rep_lens[rep_best]);
        if self.opt_end < MATCH_LEN_MIN {
            debug_assert_eq!(self.opt_end, 0);
            enc.back = self.opts[1].back_prev;
            return 1;
        }

        enc.update_prices();

        self.opts[0].state = state;
        self.opts[0].reps = enc.coder.reps;

        for i in (MATCH_LEN_MIN..=self.opt_end).rev() {
            self.opts[i].reset();
        }

        for rep in 0..REPS {
            let mut rep_len = self.rep_lens[rep];
            if rep_len < MATCH_LEN_MIN {
                continue;
            }
            let long_rep_price = enc.long_rep_price(any_rep_price, rep, state, pos_state);
            loop {
                let price = long_rep_price + enc.rep_len_price(rep_len, pos_state);
                if price < self.opts[rep_len].price {
                    self.opts[rep_len].set1(price, 0, rep as i32);
                }
                rep_len -= 1;
                if rep_len < MATCH_LEN_MIN {
                    break;
                }
            }
        }

        {
            let mut len = (self.rep_lens[0] + 1).max(MATCH_LEN_MIN);
            if len <= main_len {
                let normal_match_price = enc.normal_match_price(any_match_price, state);
                let m = &enc.lz.matches;
                let mut i = 0;
                while len > m.len[i] {
                    i += 1;
                }
                loop {
                    let dist = m.dist[i];
                    let price = enc.match_and_len_price(normal_match_price, dist, len, pos_state);
                    if price < self.opts[len].price {
                        self.opts[len].set1(price, 0, (dist + REPS as u32) as i32);
                    }
                    if len == m.len[i] {
                        i += 1;
                        if i == m.count {
                            break;
                        }
                    }
                    len += 1;
                }
            }
        }

        let mut avail = enc.lz.avail().min(OPTS - 1);

        loop {
            self.opt_cur += 1;
            if self.opt_cur >= self.opt_end {
                break;
            }

            enc.find_matches();
            {
                let m = &enc.lz.matches;
                if m.count > 0 && m.len[m.count - 1] >= nice_len {
                    break;
                }
            }

            avail -= 1;
            pos = pos.wrapping_add(1);
            pos_state = (pos & enc.coder.pos_mask) as usize;

            self.update_opt_state_and_reps();
            let cur_state = self.opts[self.opt_cur].state;
            any_match_price = self.opts[self.opt_cur].price + enc.any_match_price(cur_state, pos_state);
            any_rep_price = enc.any_rep_price(any_match_price, cur_state);

            self.calc_1byte_prices(enc, pos, pos_state, avail, any_rep_price);

            if avail >= MATCH_LEN_MIN {
                let start_len = self.calc_long_rep_prices(enc, pos, pos_state, avail, any_rep_price);
                if enc.lz.matches.count > 0 {
                    self.calc_normal_match_prices(enc, pos, pos_state, avail, any_match_price, start_len);
                }
            }
        }

        self.convert_opts(enc)
    }

    fn update_opt_state_and_reps(&mut self) {
        let opts = &mut self.opts;
        let opt_cur = self.opt_cur;
        let mut opt_prev = opts[opt_cur].opt_prev;
        debug_assert!(opt_prev < opt_cur);

        if opts[opt_cur].prev1_is_literal {
            opt_prev -= 1;
            if opts[opt_cur].has_prev2 {
                let mut s = opts[opts[opt_cur].opt_prev2].state;
                s = if opts[opt_cur].back_prev2 < REPS as i32 {
                    s.after_long_rep()
                } else {
                    s.after_match()
                };
                opts[opt_cur].state = s;
            } else {
                opts[opt_cur].state = opts[opt_prev].state;
            }
            opts[opt_cur].state = opts[opt_cur].state.after_literal();
        } else {
            opts[opt_cur].state = opts[opt_prev].state;
        }

        if opt_prev == opt_cur - 1 {
            // A literal or a short rep.
            debug_assert!(opts[opt_cur].back_prev == 0 || opts[opt_cur].back_prev == BACK_LITERAL);
            opts[opt_cur].state = if opts[opt_cur].back_prev == 0 {
                opts[opt_cur].state.after_short_rep()
            } else {
                opts[opt_cur].state.after_literal()
            };
            opts[opt_cur].reps = opts[opt_prev].reps;
        } else {
            let back;
            if opts[opt_cur].prev1_is_literal && opts[opt_cur].has_prev2 {
                opt_prev = opts[opt_cur].opt_prev2;
                back = opts[opt_cur].back_prev2;
                opts[opt_cur].state = opts[opt_cur].state.after_long_rep();
            } else {
                back = opts[opt_cur].back_prev;
                opts[opt_cur].state = if back < REPS as i32 {
                    opts[opt_cur].state.after_long_rep()
                } else {
                    opts[opt_cur].state.after_match()
                };
            }

            let prev_reps = opts[opt_prev].reps;
            let reps = &mut opts[opt_cur].reps;
            if back < REPS as i32 {
                let back = back as usize;
                reps[0] = prev_reps[back];
                reps[1..=back].copy_from_slice(&prev_reps[..back]);
                reps[back + 1..].copy_from_slice(&prev_reps[back + 1..]);
            } else {
                reps[0] = (back - REPS as i32) as u32;
                reps[1..].copy_from_slice(&prev_reps[..REPS - 1]);
            }
        }
    }

    /// Prices of a literal, a short rep and literal + rep0.
    fn calc_1byte_prices(&mut self, enc: &EncoderCore, pos: u32, pos_state: usize, avail: usize, any_rep_price: u32) {
        let opt_cur = self.opt_cur;
        let cur = self.opts[opt_cur];
        let mut next_is_byte = false;

        let cur_byte = enc.lz.byte_back(0);
        let match_byte = enc.lz.byte_back(cur.reps[0] as usize + 1);

        let literal_price =
            cur.price + enc.literal_price(cur_byte, match_byte, enc.lz.byte_back(1), pos, cur.state);
        if literal_price < self.opts[opt_cur + 1].price {
            self.opts[opt_cur + 1].set1(literal_price, opt_cur, BACK_LITERAL);
            next_is_byte = true;
        }

        if match_byte == cur_byte
            && (self.opts[opt_cur + 1].opt_prev == opt_cur || self.opts[opt_cur + 1].back_prev != 0)
        {
            let short_rep_price = enc.short_rep_price(any_rep_price, cur.state, pos_state);
            if short_rep_price <= self.opts[opt_cur + 1].price {
                self.opts[opt_cur + 1].set1(short_rep_price, opt_cur, 0);
                next_is_byte = true;
            }
        }

        if !next_is_byte && match_byte != cur_byte && avail > MATCH_LEN_MIN {
            let len_limit = enc.nice_len.min(avail - 1);
            let len = enc.lz.match_len_at(1, cur.reps[0], len_limit);

            if len >= MATCH_LEN_MIN {
                let next_state = cur.state.after_literal();
                let next_pos_state = (pos.wrapping_add(1) & enc.coder.pos_mask) as usize;
                let price = literal_price + enc.long_rep_and_len_price(0, len, next_state, next_pos_state);

                let i = opt_cur + 1 + len;
                while self.opt_end < i {
                    self.opt_end += 1;
                    self.opts[self.opt_end].reset();
                }

                if price < self.opts[i].price {
                    self.opts[i].set2(price, opt_cur, 0);
                }
            }
        }
    }

    /// Prices of long reps and long rep + literal + rep0. Returns the
    /// shortest normal match length still worth trying.
    fn calc_long_rep_prices(
        &mut self,
        enc: &EncoderCore,
        pos: u32,
        pos_state: usize,
        avail: usize,
        any_rep_price: u32,
    ) -> usize {
        let opt_cur = self.opt_cur;
        let cur = self.opts[opt_cur];
        let mut start_len = MATCH_LEN_MIN;
        let len_limit = avail.min(enc.nice_len);

        for rep in 0..REPS {
            let len = enc.lz.match_len(cur.reps[rep], len_limit);
            if len < MATCH_LEN_MIN {
                continue;
            }

            while self.opt_end < opt_cur + len {
                self.opt_end += 1;
                self.opts[self.opt_end].reset();
            }

            let long_rep_price = enc.long_rep_price(any_rep_price, rep, cur.state, pos_state);

            for i in (MATCH_LEN_MIN..=len).rev() {
                let price = long_rep_price + enc.rep_len_price(i, pos_state);
                if price < self.opts[opt_cur + i].price {
                    self.opts[opt_cur + i].set1(price, opt_cur, rep as i32);
                }
            }

            if rep == 0 {
                start_len = len + 1;
            }

            let len2_limit = enc.nice_len.min(avail.saturating_sub(len + 1));
            let len2 = enc.lz.match_len_at(len + 1, cur.reps[rep], len2_limit);

            if len2 >= MATCH_LEN_MIN {
                // Rep
                let mut price = long_rep_price + enc.rep_len_price(len, pos_state);
                let mut next_state = cur.state.after_long_rep();

                // Literal
                let cur_byte = enc.lz.byte_at(len, 0);
                let match_byte = enc.lz.byte_back(0);
                let prev_byte = enc.lz.byte_at(len, 1);
                price += enc.literal_price(cur_byte, match_byte, prev_byte, pos.wrapping_add(len as u32), next_state);
                next_state = next_state.after_literal();

                // Rep0
                let next_pos_state = (pos.wrapping_add(len as u32 + 1) & enc.coder.pos_mask) as usize;
                price += enc.long_rep_and_len_price(0, len2, next_state, next_pos_state);

                let i = opt_cur + len + 1 + len2;
                while self.opt_end < i {
                    self.opt_end += 1;
                    self.opts[self.opt_end].reset();
                }

                if price < self.opts[i].price {
                    self.opts[i].set3(price, opt_cur, rep as i32, len, 0);
                }
            }
        }

        start_len
    }

    /// Prices of normal matches and match + literal + rep0.
    fn calc_normal_match_prices(
        &mut self,
        enc: &mut EncoderCore,
        pos: u32,
        pos_state: usize,
        avail: usize,
        any_match_price: u32,
        start_len: usize,
    ) {
        let opt_cur = self.opt_cur;
        let cur = self.opts[opt_cur];

        {
            // Shorten matches that would not fit into the opts array.
            let m = &mut enc.lz.matches;
            if m.len[m.count - 1] > avail {
                m.count = 0;
                while m.len[m.count] < avail {
                    m.count += 1;
                }
                m.len[m.count] = avail;
                m.count += 1;
            }
            if m.len[m.count - 1] < start_len {
                return;
            }
            let longest = m.len[m.count - 1];
            while self.opt_end < opt_cur + longest {
                self.opt_end += 1;
                self.opts[self.opt_end].reset();
            }
        }

        let enc: &EncoderCore = enc;
        let m = &enc.lz.matches;
        let normal_match_price = enc.normal_match_price(any_match_price, cur.state);

        let mut index = 0;
        while start_len > m.len[index] {
            index += 1;
        }

        let mut len = start_len;
        loop {
            let dist = m.dist[index];
            let back = (dist + REPS as u32) as i32;

            let match_and_len_price = enc.match_and_len_price(normal_match_price, dist, len, pos_state);
            if match_and_len_price < self.opts[opt_cur + len].price {
                self.opts[opt_cur + len].set1(match_and_len_price, opt_cur, back);
            }

            if len == m.len[index] {
                let len2_limit = enc.nice_len.min(avail.saturating_sub(len + 1));
                let len2 = enc.lz.match_len_at(len + 1, dist, len2_limit);

                if len2 >= MATCH_LEN_MIN {
                    let mut next_state = cur.state.after_match();

                    // Literal
                    let cur_byte = enc.lz.byte_at(len, 0);
                    let match_byte = enc.lz.byte_back(0);
                    let prev_byte = enc.lz.byte_at(len, 1);
                    let mut price = match_and_len_price
                        + enc.literal_price(cur_byte, match_byte, prev_byte, pos.wrapping_add(len as u32), next_state);
                    next_state = next_state.after_literal();

                    // Rep0
                    let next_pos_state = (pos.wrapping_add(len as u32 + 1) & enc.coder.pos_mask) as usize;
                    price += enc.long_rep_and_len_price(0, len2, next_state, next_pos_state);

                    let i = opt_cur + len + 1 + len2;
                    while self.opt_end < i {
                        self.opt_end += 1;
                        self.opts[self.opt_end].reset();
                    }

                    if price < self.opts[i].price {
                        self.opts[i].set3(price, opt_cur, back, len, 0);
                    }
                }

                index += 1;
                if index == m.count {
                    break;
                }
            }
            len += 1;
        }
    }
}
