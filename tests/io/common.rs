// Shared helpers for the parallel pipeline tests.
#![allow(dead_code)]

use lzma2::frame::ChunkHeader;
use lzma2::{DictMode, ParallelConfig, StreamOptions};

pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

/// Options with an explicit dictionary, affinity, block size and mode.
pub fn parallel_options(
    preset: u32,
    dict: usize,
    affinity: usize,
    block: usize,
    mode: DictMode,
) -> StreamOptions {
    let mut o = StreamOptions::with_preset(preset).unwrap();
    o.set_dict_size(dict).unwrap();
    let mut p = ParallelConfig::new();
    p.set_affinity(affinity).unwrap();
    p.set_block_size(Some(block)).unwrap();
    p.set_dict_mode(mode);
    o.set_parallel(Some(p));
    o
}

/// The same options without the parallel configuration.
pub fn single_stream(o: &StreamOptions) -> StreamOptions {
    // Clones never carry the parallel part.
    o.clone()
}

/// Compressible text with long-range repeats.
pub fn text(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut i = 0u32;
    while out.len() < len {
        let line = format!("line {} of the sample: value={} tag={}\n", i % 977, i.wrapping_mul(31) % 113, i % 7);
        out.extend_from_slice(line.as_bytes());
        i += 1;
    }
    out.truncate(len);
    out
}

pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 32) as u8
        })
        .collect()
}

/// Every chunk header of a complete stream with its byte offset.
pub fn chunk_offsets(stream: &[u8]) -> Vec<(usize, ChunkHeader)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let mut r = &stream[pos..];
        let h = ChunkHeader::read_from(&mut r).unwrap();
        if h == ChunkHeader::End {
            assert_eq!(pos + 1, stream.len(), "bytes after end marker");
            return out;
        }
        out.push((pos, h));
        pos += h.encoded_len() + h.payload_len();
    }
}
