// Integration tests for the parallel encoder frontend (src/io/par_writer.rs).
//
// Coverage:
//   - the 1 MiB zero scenario (dict 1 MiB, affinity 4, block 256 KiB)
//   - output is identical for every affinity
//   - a slow early block does not reorder the output
//   - Sync and Async produce identical bytes
//   - Sync/Async output decodes with the single-stream reader
//   - every preset round trips in every dictionary mode
//   - None mode: one dictionary reset per block, blocks decode independently
//   - preset dictionaries with every dictionary mode
//   - trailing partial blocks and empty input

use std::io::Write;

use lzma2::frame::Lzma2Reader;
use lzma2::io::ParallelWriter;
use lzma2::{compress, decompress, DictMode, StreamOptions};

use super::common::{chunk_offsets, noise, parallel_options, single_stream, text, KB, MB};

fn encode_in_pieces(data: &[u8], o: &StreamOptions, piece: usize) -> Vec<u8> {
    let mut w = ParallelWriter::new(Vec::new(), o).unwrap();
    for p in data.chunks(piece) {
        w.write_all(p).unwrap();
    }
    w.finish().unwrap()
}

#[test]
fn megabyte_of_zeros() {
    let o = parallel_options(6, MB, 4, 256 * KB, DictMode::Sync);
    let data = vec![0u8; MB];
    let packed = compress(&data, &o).unwrap();
    assert_eq!(*packed.last().unwrap(), 0x00);
    assert!(packed.len() < 4 * KB);
    let out = decompress(&packed, &o).unwrap();
    assert_eq!(out.len(), MB);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn output_does_not_depend_on_affinity() {
    let data = text(900 * KB);
    let reference = compress(&data, &parallel_options(1, 128 * KB, 1, 64 * KB, DictMode::Sync)).unwrap();
    for affinity in [2, 3, 8] {
        let o = parallel_options(1, 128 * KB, affinity, 64 * KB, DictMode::Sync);
        assert_eq!(compress(&data, &o).unwrap(), reference, "affinity {affinity}");
    }
}

#[test]
fn slow_first_block_keeps_the_order() {
    // Block 0 is noise for the optimal parser; the zero blocks behind it
    // finish long before it does.
    let mut data = noise(256 * KB, 5);
    data.extend(vec![0u8; 768 * KB]);
    for mode in [DictMode::None, DictMode::Sync] {
        let reference = compress(&data, &parallel_options(9, 256 * KB, 1, 256 * KB, mode)).unwrap();
        let o = parallel_options(9, 256 * KB, 4, 256 * KB, mode);
        let packed = compress(&data, &o).unwrap();
        assert_eq!(packed, reference, "{mode:?}");
        assert_eq!(decompress(&packed, &o).unwrap(), data, "{mode:?}");
    }
}

#[test]
fn sync_and_async_are_identical() {
    let mut data = text(700 * KB);
    data.extend(noise(100 * KB, 9));
    data.extend(text(300 * KB));
    for (dict, block) in [(64 * KB, 64 * KB), (200 * KB, 64 * KB), (64 * KB, 256 * KB)] {
        let sync = parallel_options(2, dict, 3, block, DictMode::Sync);
        let asyn = parallel_options(2, dict, 3, block, DictMode::Async);
        let a = compress(&data, &sync).unwrap();
        let b = compress(&data, &asyn).unwrap();
        assert_eq!(a, b, "dict {dict} block {block}");

        // One continuous stream: the single-stream reader decodes it.
        let single = single_stream(&sync);
        assert_eq!(decompress(&a, &single).unwrap(), data);
    }
}

#[test]
fn every_preset_in_every_mode() {
    let mut mixed = text(150 * KB);
    mixed.extend(noise(20 * KB, 3));
    mixed.extend(text(90 * KB));
    let inputs = [text(484), text(5000), mixed];
    for preset in 0..=9 {
        for mode in [DictMode::None, DictMode::Sync, DictMode::Async] {
            let o = parallel_options(preset, 64 * KB, 3, 64 * KB, mode);
            for data in &inputs {
                let packed = compress(data, &o).unwrap();
                let label = format!("preset {preset} {mode:?} len {}", data.len());
                assert_eq!(decompress(&packed, &o).unwrap(), *data, "{label}");
                if mode != DictMode::None {
                    let single = single_stream(&o);
                    assert_eq!(decompress(&packed, &single).unwrap(), *data, "{label}");
                }
            }
        }
    }
}

#[test]
fn dictionary_carries_across_blocks() {
    // The second half repeats the first: only a shared dictionary finds it.
    let half = noise(128 * KB, 5);
    let mut data = half.clone();
    data.extend_from_slice(&half);
    let sync = compress(&data, &parallel_options(1, 256 * KB, 2, 128 * KB, DictMode::Sync)).unwrap();
    let none = compress(&data, &parallel_options(1, 256 * KB, 2, 128 * KB, DictMode::None)).unwrap();
    assert!(sync.len() < none.len() * 3 / 4, "{} vs {}", sync.len(), none.len());
}

#[test]
fn none_mode_blocks_are_independent() {
    let block = 64 * KB;
    let data = text(5 * block + 1234);
    let o = parallel_options(3, 64 * KB, 4, block, DictMode::None);
    let packed = compress(&data, &o).unwrap();

    let chunks = chunk_offsets(&packed);
    let starts: Vec<usize> = chunks
        .iter()
        .filter(|(_, h)| h.is_dict_reset())
        .map(|(pos, _)| *pos)
        .collect();
    assert_eq!(starts.len(), 6);

    // Each group decodes on its own into exactly its block.
    let end = packed.len() - 1;
    for (i, &start) in starts.iter().enumerate() {
        let stop = starts.get(i + 1).copied().unwrap_or(end);
        let mut group = packed[start..stop].to_vec();
        group.push(0x00);
        let mut r = Lzma2Reader::with_dict(&group[..], o.dict_size(), &[]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut r, &mut out).unwrap();
        let expect = &data[i * block..((i + 1) * block).min(data.len())];
        assert_eq!(out, expect, "group {i}");
    }
}

#[test]
fn preset_dictionary_in_every_mode() {
    let dict_bytes = text(40 * KB);
    let data = text(300 * KB);
    for mode in [DictMode::None, DictMode::Sync, DictMode::Async] {
        let mut o = parallel_options(2, 64 * KB, 3, 64 * KB, mode);
        o.set_preset_dict(Some(&dict_bytes));
        let packed = compress(&data, &o).unwrap();
        assert_eq!(decompress(&packed, &o).unwrap(), data, "{mode:?}");
        if mode != DictMode::None {
            assert_eq!(decompress(&packed, &single_stream(&o)).unwrap(), data);
        }
    }
}

#[test]
fn piecewise_writes_match_one_shot() {
    let data = text(333 * KB + 7);
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::Sync);
    let whole = compress(&data, &o).unwrap();
    assert_eq!(encode_in_pieces(&data, &o, 1000), whole);
    assert_eq!(encode_in_pieces(&data, &o, 100 * KB), whole);
}

#[test]
fn empty_and_tiny_inputs() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::Sync);
    assert_eq!(compress(&[], &o).unwrap(), vec![0x00]);
    let packed = compress(b"x", &o).unwrap();
    assert_eq!(decompress(&packed, &o).unwrap(), b"x");
}

#[test]
fn flush_keeps_the_stream_open() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::Async);
    let data = text(200 * KB);
    let mut w = ParallelWriter::new(Vec::new(), &o).unwrap();
    w.write_all(&data[..10 * KB]).unwrap();
    w.flush().unwrap();
    let flushed = w.get_ref().unwrap().len();
    assert!(flushed > 0);
    w.write_all(&data[10 * KB..]).unwrap();
    let packed = w.finish().unwrap();
    assert!(packed.len() > flushed);
    assert_eq!(decompress(&packed, &o).unwrap(), data);
    assert_eq!(decompress(&packed, &single_stream(&o)).unwrap(), data);
}
