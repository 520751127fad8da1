//! 2-, 3- and 4-byte hash tables shared by the HC4 and BT4 match finders.

const HASH_2_SIZE: usize = 1 << 10;
const HASH_2_MASK: u32 = HASH_2_SIZE as u32 - 1;
const HASH_3_SIZE: usize = 1 << 16;
const HASH_3_MASK: u32 = HASH_3_SIZE as u32 - 1;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = i as u32;
        let mut j = 0;
        while j < 8 {
            r = if r & 1 != 0 { (r >> 1) ^ 0xEDB8_8320 } else { r >> 1 };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

pub(crate) struct Hash234 {
    hash4_mask: u32,
    hash2_table: Vec<u32>,
    hash3_table: Vec<u32>,
    hash4_table: Vec<u32>,
    hash2_value: usize,
    hash3_value: usize,
    hash4_value: usize,
}

impl Hash234 {
    /// Number of entries in the 4-byte table for a dictionary of `dict_size`.
    pub(crate) fn hash4_size(dict_size: usize) -> usize {
        let mut h = dict_size as u32 - 1;
        h |= h >> 1;
        h |= h >> 2;
        h |= h >> 4;
        h |= h >> 8;
        h |= h >> 16;
        h >>= 1;
        h |= 0xFFFF;
        if h > (1 << 24) {
            h >>= 1;
        }
        h as usize + 1
    }

    /// Memory used by the tables, in KiB.
    pub(crate) fn memory_usage(dict_size: usize) -> usize {
        (HASH_2_SIZE + HASH_3_SIZE + Self::hash4_size(dict_size)) / (1024 / 4) + 4
    }

    pub(crate) fn new(dict_size: usize) -> Self {
        let hash4_size = Self::hash4_size(dict_size);
        Hash234 {
            hash4_mask: hash4_size as u32 - 1,
            hash2_table: vec![0; HASH_2_SIZE],
            hash3_table: vec![0; HASH_3_SIZE],
            hash4_table: vec![0; hash4_size],
            hash2_value: 0,
            hash3_value: 0,
            hash4_value: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.hash2_table.fill(0);
        self.hash3_table.fill(0);
        self.hash4_table.fill(0);
    }

    /// Hash the four bytes starting at `buf[off]`.
    #[inline]
    pub(crate) fn calc_hashes(&mut self, buf: &[u8], off: usize) {
        let mut temp = CRC_TABLE[buf[off] as usize] ^ buf[off + 1] as u32;
        self.hash2_value = (temp & HASH_2_MASK) as usize;
        temp ^= (buf[off + 2] as u32) << 8;
        self.hash3_value = (temp & HASH_3_MASK) as usize;
        temp ^= CRC_TABLE[buf[off + 3] as usize] << 5;
        self.hash4_value = (temp & self.hash4_mask) as usize;
    }

    #[inline]
    pub(crate) fn hash2_pos(&self) -> u32 {
        self.hash2_table[self.hash2_value]
    }

    #[inline]
    pub(crate) fn hash3_pos(&self) -> u32 {
        self.hash3_table[self.hash3_value]
    }

    #[inline]
    pub(crate) fn hash4_pos(&self) -> u32 {
        self.hash4_table[self.hash4_value]
    }

    #[inline]
    pub(crate) fn update_tables(&mut self, pos: u32) {
        self.hash2_table[self.hash2_value] = pos;
        self.hash3_table[self.hash3_value] = pos;
        self.hash4_table[self.hash4_value] = pos;
    }

    pub(crate) fn normalize(&mut self, offset: u32) {
        normalize(&mut self.hash2_table, offset);
        normalize(&mut self.hash3_table, offset);
        normalize(&mut self.hash4_table, offset);
    }
}

/// Shift stored positions down by `offset`; positions that would fall at or
/// below zero become 0, which every finder treats as "no match".
pub(crate) fn normalize(positions: &mut [u32], offset: u32) {
    for p in positions {
        *p = p.saturating_sub(offset);
    }
}
