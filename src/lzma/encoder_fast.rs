//! Greedy parser with one byte of lazy look-ahead.

use super::encoder::{EncoderCore, BACK_LITERAL};
use super::lz_encoder::LzEncoder;
use super::{MATCH_LEN_MAX, MATCH_LEN_MIN, REPS};
use crate::options::MatchFinder;

const EXTRA_SIZE_BEFORE: usize = 1;
const EXTRA_SIZE_AFTER: usize = MATCH_LEN_MAX - 1;

/// True when `small_dist` is so much shorter than `big_dist` that a match one
/// byte shorter at `small_dist` is the better deal.
#[inline]
fn change_pair(small_dist: u32, big_dist: u32) -> bool {
    small_dist < (big_dist >> 7)
}

pub(crate) struct FastParser;

impl FastParser {
    pub(crate) fn memory_usage(dict_size: usize, extra_size_before: usize, mf: MatchFinder) -> usize {
        LzEncoder::memory_usage(
            dict_size,
            extra_size_before.max(EXTRA_SIZE_BEFORE),
            EXTRA_SIZE_AFTER,
            MATCH_LEN_MAX,
            mf,
        )
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

    pub(crate) fn next_symbol(&mut self, enc: &mut EncoderCore) -> usize {
        // Matches for this byte may already be known from the look-ahead of
        // the previous call.
        if enc.read_ahead == -1 {
            enc.find_matches();
        }

        enc.back = BACK_LITERAL;

        let avail = enc.lz.avail().min(MATCH_LEN_MAX);
        if avail < MATCH_LEN_MIN {
            return 1;
        }

        let nice_len = enc.nice_len;
        let mut best_rep_len = 0;
        let mut best_rep_index = 0;
        for rep in 0..REPS {
            let len = enc.lz.match_len(enc.coder.reps[rep], avail);
            if len < MATCH_LEN_MIN {
                continue;
            }
            if len >= nice_len {
                enc.back = rep as i32;
                enc.skip(len - 1);
                return len;
            }
            if len > best_rep_len {
                best_rep_index = rep;
                best_rep_len = len;
            }
        }

        let mut main_len = 0;
        let mut main_dist = 0;
        {
            let m = &mut enc.lz.matches;
            if m.count > 0 {
                main_len = m.len[m.count - 1];
                main_dist = m.dist[m.count - 1];

                if main_len >= nice_len {
                    enc.back = (main_dist + REPS as u32) as i32;
                    enc.skip(main_len - 1);
                    return main_len;
                }

                while m.count > 1 && main_len == m.len[m.count - 2] + 1 {
                    if !change_pair(m.dist[m.count - 2], main_dist) {
                        break;
                    }
                    m.count -= 1;
                    main_len = m.len[m.count - 1];
                    main_dist = m.dist[m.count - 1];
                }

                if main_len == MATCH_LEN_MIN && main_dist >= 0x80 {
                    main_len = 1;
                }
            }
        }

        if best_rep_len >= MATCH_LEN_MIN
            && (best_rep_len + 1 >= main_len
                || (best_rep_len + 2 >= main_len && main_dist >= (1 << 9))
                || (best_rep_len + 3 >= main_len && main_dist >= (1 << 15)))
        {
            enc.back = best_rep_index as i32;
            enc.skip(best_rep_len - 1);
            return best_rep_len;
        }

        if main_len < MATCH_LEN_MIN || avail <= MATCH_LEN_MIN {
            return 1;
        }

        // Look one byte ahead; if the next position has a better match, emit
        // this byte as a literal.
        enc.find_matches();
        let m = &enc.lz.matches;
        if m.count > 0 {
            let new_len = m.len[m.count - 1];
            let new_dist = m.dist[m.count - 1];
            if (new_len >= main_len && new_dist < main_dist)
                || (new_len == main_len + 1 && !change_pair(main_dist, new_dist))
                || new_len > main_len + 1
                || (new_len + 1 >= main_len
                    && main_len >= MATCH_LEN_MIN + 1
                    && change_pair(new_dist, main_dist))
            {
                return 1;
            }
        }

        let limit = (main_len - 1).max(MATCH_LEN_MIN);
        for rep in 0..REPS {
            if enc.lz.match_len(enc.coder.reps[rep], limit) == limit {
                return 1;
            }
        }

        enc.back = (main_dist + REPS as u32) as i32;
        enc.skip(main_len - 2);
        main_len
    }
}
