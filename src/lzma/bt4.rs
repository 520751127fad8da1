//! Binary-tree match finder over 2/3/4-byte hashes.

use super::hash234::{self, Hash234};
use super::lz_encoder::{Matches, Window};

const NORMALIZE_AT: u32 = i32::MAX as u32;

pub(crate) struct Bt4 {
    hash: Hash234,
    tree: Vec<u32>,
    depth_limit: u32,
    cyclic_size: u32,
    cyclic_pos: u32,
    lz_pos: u32,
}

impl Bt4 {
    /// Memory used by the finder in KiB (the window is counted separately).
    pub(crate) fn memory_usage(dict_size: usize) -> usize {
        Hash234::memory_usage(dict_size) + dict_size / (1024 / 8) + 10
    }

    pub(crate) fn new(dict_size: usize, nice_len: usize, depth_limit: u32) -> Self {
        let cyclic_size = dict_size as u32 + 1;
        Bt4 {
            hash: Hash234::new(dict_size),
            tree: vec![0; cyclic_size as usize * 2],
            depth_limit: if depth_limit > 0 {
                depth_limit
            } else {
                16 + nice_len as u32 / 2
            },
            cyclic_size,
            cyclic_pos: u32::MAX,
            lz_pos: cyclic_size,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.hash.reset();
        self.cyclic_pos = u32::MAX;
        self.lz_pos = self.cyclic_size;
    }

    fn move_pos(&mut self, win: &mut Window) -> usize {
        let avail = win.move_pos(win.nice_len, 4);
        if avail != 0 {
            self.lz_pos += 1;
            if self.lz_pos == NORMALIZE_AT {
                let offset = NORMALIZE_AT - self.cyclic_size;
                self.hash.normalize(offset);
                hash234::normalize(&mut self.tree, offset);
                self.lz_pos -= offset;
            }
            self.cyclic_pos = self.cyclic_pos.wrapping_add(1);
            if self.cyclic_pos == self.cyclic_size {
                self.cyclic_pos = 0;
            }
        }
        avail
    }

    #[inline]
    fn pair_index(&self, delta: u32) -> usize {
        let slot = if delta > self.cyclic_pos {
            self.cyclic_pos + self.cyclic_size - delta
        } else {
            self.cyclic_pos - delta
        };
        slot as usize * 2
    }

    pub(crate) fn get_matches(&mut self, win: &mut Window, matches: &mut Matches) {
        matches.count = 0;
        let mut match_len_limit = win.match_len_max;
        let mut nice_len_limit = win.nice_len;
        let avail = self.move_pos(win);
        if avail < match_len_limit {
            if avail == 0 {
                return;
            }
            match_len_limit = avail;
            nice_len_limit = nice_len_limit.min(avail);
        }

        let cur = win.cur();
        let buf = &win.buf;
        self.hash.calc_hashes(buf, cur);
        let mut delta2 = self.lz_pos - self.hash.hash2_pos();
        let delta3 = self.lz_pos - self.hash.hash3_pos();
        let mut current_match = self.hash.hash4_pos();
        self.hash.update_tables(self.lz_pos);

        let mut len_best = 0;

        if delta2 < self.cyclic_size && buf[cur - delta2 as usize] == buf[cur] {
            len_best = 2;
            matches.len[0] = 2;
            matches.dist[0] = delta2 - 1;
            matches.count = 1;
        }

        if delta2 != delta3 && delta3 < self.cyclic_size && buf[cur - delta3 as usize] == buf[cur] {
            len_best = 3;
            matches.dist[matches.count] = delta3 - 1;
            matches.count += 1;
            delta2 = delta3;
        }

        if matches.count > 0 {
            let back = cur - delta2 as usize;
            while len_best < match_len_limit && buf[back + len_best] == buf[cur + len_best] {
                len_best += 1;
            }
            matches.len[matches.count - 1] = len_best;
            if len_best >= nice_len_limit {
                self.skip_tree(buf, cur, nice_len_limit, current_match);
                return;
            }
        }

        len_best = len_best.max(3);

        let mut depth = self.depth_limit;
        let mut ptr0 = self.cyclic_pos as usize * 2 + 1;
        let mut ptr1 = self.cyclic_pos as usize * 2;
        let mut len0 = 0;
        let mut len1 = 0;

        loop {
            let delta = self.lz_pos - current_match;
            if depth == 0 || delta >= self.cyclic_size {
                self.tree[ptr0] = 0;
                self.tree[ptr1] = 0;
                return;
            }
            depth -= 1;

            let pair = self.pair_index(delta);
            let back = cur - delta as usize;
            let mut len = len0.min(len1);

            if buf[back + len] == buf[cur + len] {
                len += 1;
                while len < match_len_limit && buf[back + len] == buf[cur + len] {
                    len += 1;
                }
                if len > len_best {
                    len_best = len;
                    matches.len[matches.count] = len;
                    matches.dist[matches.count] = delta - 1;
                    matches.count += 1;
                    if len >= nice_len_limit {
                        self.tree[ptr1] = self.tree[pair];
                        self.tree[ptr0] = self.tree[pair + 1];
                        return;
                    }
                }
            }

            if buf[back + len] < buf[cur + len] {
                self.tree[ptr1] = current_match;
                ptr1 = pair + 1;
                current_match = self.tree[ptr1];
                len1 = len;
            } else {
                self.tree[ptr0] = current_match;
                ptr0 = pair;
                current_match = self.tree[ptr0];
                len0 = len;
            }
        }
    }

    /// Insert the current position into the tree without collecting matches.
    fn skip_tree(&mut self, buf: &[u8], cur: usize, nice_len_limit: usize, mut current_match: u32) {
        let mut depth = self.depth_limit;
        let mut ptr0 = self.cyclic_pos as usize * 2 + 1;
        let mut ptr1 = self.cyclic_pos as usize * 2;
        let mut len0 = 0;
        let mut len1 = 0;

        loop {
            let delta = self.lz_pos - current_match;
            if depth == 0 || delta >= self.cyclic_size {
                self.tree[ptr0] = 0;
                self.tree[ptr1] = 0;
                return;
            }
            depth -= 1;

            let pair = self.pair_index(delta);
            let back = cur - delta as usize;
            let mut len = len0.min(len1);

            if buf[back + len] == buf[cur + len] {
                loop {
                    len += 1;
                    if len == nice_len_limit {
                        self.tree[ptr1] = self.tree[pair];
                        self.tree[ptr0] = self.tree[pair + 1];
                        return;
                    }
                    if buf[back + len] != buf[cur + len] {
                        break;
                    }
                }
            }

            if buf[back + len] < buf[cur + len] {
                self.tree[ptr1] = current_match;
                ptr1 = pair + 1;
                current_match = self.tree[ptr1];
                len1 = len;
            } else {
                self.tree[ptr0] = current_match;
                ptr0 = pair;
                current_match = self.tree[ptr0];
                len0 = len;
            }
        }
    }

    pub(crate) fn skip(&mut self, win: &mut Window, len: usize) {
        for _ in 0..len {
            let mut nice_len_limit = win.nice_len;
            let avail = self.move_pos(win);
            if avail < nice_len_limit {
                if avail == 0 {
                    continue;
                }
                nice_len_limit = avail;
            }
            let cur = win.cur();
            self.hash.calc_hashes(&win.buf, cur);
            let current_match = self.hash.hash4_pos();
            self.hash.update_tables(self.lz_pos);
            self.skip_tree(&win.buf, cur, nice_len_limit, current_match);
        }
    }
}
