//! Encoder-side sliding window and match finder dispatch.
//!
//! The window holds `keep_size_before` bytes of history (the dictionary plus
//! whatever the parser needs behind the read position) and
//! `keep_size_after` bytes of look-ahead. When the read position gets too
//! close to the end of the buffer, the live region is moved to the start;
//! moves are multiples of 16 bytes so positions keep their value modulo 16,
//! which the `lp`/`pb` contexts depend on.

use super::bt4::Bt4;
use super::hc4::Hc4;
use crate::options::MatchFinder;

/// Matches found at the current position, shortest first.
pub(crate) struct Matches {
    pub(crate) len: Vec<usize>,
    pub(crate) dist: Vec<u32>,
    pub(crate) count: usize,
}

impl Matches {
    fn new(count_max: usize) -> Self {
        Matches {
            len: vec![0; count_max],
            dist: vec![0; count_max],
            count: 0,
        }
    }
}

/// Byte window shared by the match finders.
pub(crate) struct Window {
    keep_size_before: usize,
    keep_size_after: usize,
    pub(super) match_len_max: usize,
    pub(super) nice_len: usize,
    pub(super) buf: Vec<u8>,
    read_pos: isize,
    read_limit: isize,
    finishing: bool,
    write_pos: usize,
    pending_size: usize,
}

impl Window {
    /// Read position as an index; only valid once the window has started.
    #[inline]
    pub(super) fn cur(&self) -> usize {
        self.read_pos as usize
    }

    /// Advance the read position by one byte and return how many bytes are
    /// available from there. Returns 0 (and remembers the byte as pending)
    /// when fewer than the finder needs are buffered and the stream is not
    /// finishing.
    pub(super) fn move_pos(&mut self, required_for_flushing: usize, required_for_finishing: usize) -> usize {
        self.read_pos += 1;
        let mut avail = self.write_pos - self.read_pos as usize;
        if avail < required_for_flushing && (avail < required_for_finishing || !self.finishing) {
            self.pending_size += 1;
            avail = 0;
        }
        avail
    }

    fn move_window(&mut self) {
        let move_offset = ((self.read_pos + 1) as usize - self.keep_size_before) & !15;
        self.buf.copy_within(move_offset..self.write_pos, 0);
        self.read_pos -= move_offset as isize;
        self.read_limit -= move_offset as isize;
        self.write_pos -= move_offset;
    }
}

enum Finder {
    Hc4(Hc4),
    Bt4(Bt4),
}

/// Sliding window plus its match finder.
pub(crate) struct LzEncoder {
    win: Window,
    finder: Finder,
    pub(crate) matches: Matches,
}

impl LzEncoder {
    fn buf_size(dict_size: usize, extra_before: usize, extra_after: usize, match_len_max: usize) -> usize {
        let keep_before = extra_before + dict_size;
        let keep_after = extra_after + match_len_max;
        let reserve = (dict_size / 2 + (256 << 10)).min(512 << 20);
        keep_before + keep_after + reserve
    }

    /// Approximate memory usage in KiB.
    pub(crate) fn memory_usage(
        dict_size: usize,
        extra_before: usize,
        extra_after: usize,
        match_len_max: usize,
        mf: MatchFinder,
    ) -> usize {
        let m = Self::buf_size(dict_size, extra_before, extra_after, match_len_max) / 1024 + 10;
        m + match mf {
            MatchFinder::Hc4 => Hc4::memory_usage(dict_size),
            MatchFinder::Bt4 => Bt4::memory_usage(dict_size),
        }
    }

    pub(crate) fn new(
        dict_size: usize,
        extra_before: usize,
        extra_after: usize,
        nice_len: usize,
        match_len_max: usize,
        mf: MatchFinder,
        depth_limit: u32,
    ) -> Self {
        let buf_size = Self::buf_size(dict_size, extra_before, extra_after, match_len_max);
        let win = Window {
            keep_size_before: extra_before + dict_size,
            keep_size_after: extra_after + match_len_max,
            match_len_max,
            nice_len,
            buf: vec![0; buf_size],
            read_pos: -1,
            read_limit: -1,
            finishing: false,
            write_pos: 0,
            pending_size: 0,
        };
        let finder = match mf {
            MatchFinder::Hc4 => Finder::Hc4(Hc4::new(dict_size, nice_len, depth_limit)),
            MatchFinder::Bt4 => Finder::Bt4(Bt4::new(dict_size, nice_len, depth_limit)),
        };
        LzEncoder {
            win,
            finder,
            matches: Matches::new(nice_len - 1),
        }
    }

    /// Forget all data so the encoder can start a new independent stream.
    pub(crate) fn reset(&mut self) {
        self.win.read_pos = -1;
        self.win.read_limit = -1;
        self.win.finishing = false;
        self.win.write_pos = 0;
        self.win.pending_size = 0;
        match &mut self.finder {
            Finder::Hc4(f) => f.reset(),
            Finder::Bt4(f) => f.reset(),
        }
    }

    /// Load the last `dict_size` bytes of `preset` as history. Must be called
    /// before any data is written.
    pub(crate) fn set_preset_dict(&mut self, dict_size: usize, preset: &[u8]) {
        debug_assert!(!self.is_started());
        debug_assert_eq!(self.win.write_pos, 0);
        if preset.is_empty() {
            return;
        }
        let copy_size = preset.len().min(dict_size);
        let offset = preset.len() - copy_size;
        self.win.buf[..copy_size].copy_from_slice(&preset[offset..]);
        self.win.write_pos += copy_size;
        self.skip(copy_size);
    }

    /// Copy as much of `input` into the window as fits; returns the count.
    pub(crate) fn fill_window(&mut self, input: &[u8]) -> usize {
        debug_assert!(!self.win.finishing);
        let win = &mut self.win;
        if win.read_pos >= (win.buf.len() - win.keep_size_after) as isize {
            win.move_window();
        }
        let len = input.len().min(win.buf.len() - win.write_pos);
        win.buf[win.write_pos..win.write_pos + len].copy_from_slice(&input[..len]);
        win.write_pos += len;
        if win.write_pos >= win.keep_size_after {
            win.read_limit = (win.write_pos - win.keep_size_after) as isize;
        }
        self.process_pending_bytes();
        len
    }

    fn process_pending_bytes(&mut self) {
        if self.win.pending_size > 0 && self.win.read_pos < self.win.read_limit {
            let old_pending = self.win.pending_size;
            self.win.read_pos -= old_pending as isize;
            self.win.pending_size = 0;
            self.skip(old_pending);
            debug_assert!(self.win.pending_size < old_pending);
        }
    }

    #[inline]
    pub(crate) fn is_started(&self) -> bool {
        self.win.read_pos != -1
    }

    /// Allow encoding up to the last buffered byte without closing the stream.
    pub(crate) fn set_flushing(&mut self) {
        self.win.read_limit = self.win.write_pos as isize - 1;
        self.process_pending_bytes();
    }

    /// Mark the end of input.
    pub(crate) fn set_finishing(&mut self) {
        self.win.read_limit = self.win.write_pos as isize - 1;
        self.win.finishing = true;
        self.process_pending_bytes();
    }

    #[inline]
    pub(crate) fn has_enough_data(&self, already_read: isize) -> bool {
        self.win.read_pos - already_read < self.win.read_limit
    }

    /// Append `len` bytes starting `backward` bytes behind the next unread
    /// byte to `out`.
    pub(crate) fn copy_uncompressed(&self, out: &mut Vec<u8>, backward: usize, len: usize) {
        let start = (self.win.read_pos + 1) as usize - backward;
        out.extend_from_slice(&self.win.buf[start..start + len]);
    }

    #[inline]
    pub(crate) fn avail(&self) -> usize {
        debug_assert!(self.is_started());
        self.win.write_pos - self.win.cur()
    }

    #[inline]
    pub(crate) fn pos(&self) -> isize {
        self.win.read_pos
    }

    #[inline]
    pub(crate) fn byte_back(&self, backward: usize) -> u32 {
        self.win.buf[self.win.cur() - backward] as u32
    }

    #[inline]
    pub(crate) fn byte_at(&self, forward: usize, backward: usize) -> u32 {
        self.win.buf[self.win.cur() + forward - backward] as u32
    }

    /// Length of the match at distance `dist` (0 = previous byte), capped at
    /// `limit`.
    #[inline]
    pub(crate) fn match_len(&self, dist: u32, limit: usize) -> usize {
        self.match_len_at(0, dist, limit)
    }

    pub(crate) fn match_len_at(&self, forward: usize, dist: u32, limit: usize) -> usize {
        let cur = self.win.cur() + forward;
        let back = cur - dist as usize - 1;
        let buf = &self.win.buf;
        let mut len = 0;
        while len < limit && buf[cur + len] == buf[back + len] {
            len += 1;
        }
        len
    }

    /// Advance one byte and fill `self.matches`.
    pub(crate) fn find_matches(&mut self) {
        match &mut self.finder {
            Finder::Hc4(f) => f.get_matches(&mut self.win, &mut self.matches),
            Finder::Bt4(f) => f.get_matches(&mut self.win, &mut self.matches),
        }
    }

    /// Advance `len` bytes, updating the finder without collecting matches.
    pub(crate) fn skip(&mut self, len: usize) {
        match &mut self.finder {
            Finder::Hc4(f) => f.skip(&mut self.win, len),
            Finder::Bt4(f) => f.skip(&mut self.win, len),
        }
    }
}
