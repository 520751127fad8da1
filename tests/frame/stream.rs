// Integration tests for the single-stream encoder and decoder
// (src/frame/writer.rs, src/frame/reader.rs).
//
// Coverage:
//   - round trip for every preset and for each mode
//   - first chunk resets the dictionary, later chunks never do
//   - chunk size bounds hold on large inputs
//   - incompressible data falls back to raw chunks with bounded overhead
//   - preset dictionaries shrink the output and must match on decode
//   - mid-stream property changes
//   - corrupted payloads are reported and stay sticky

use std::io::{Read, Write};

use lzma2::frame::{ChunkEncoder, ChunkHeader, Lzma2Reader, Lzma2Writer, ResetState};
use lzma2::frame::{COMPRESSED_SIZE_MAX, UNCOMPRESSED_SIZE_MAX};
use lzma2::{compress, decompress, LzmaProps, Lzma2Error, MatchFinder, Mode, StreamOptions};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn headers(stream: &[u8]) -> Vec<ChunkHeader> {
    let mut r = stream;
    let mut out = Vec::new();
    loop {
        let h = ChunkHeader::read_from(&mut r).unwrap();
        if h == ChunkHeader::End {
            assert!(r.is_empty(), "bytes after end marker");
            return out;
        }
        r = &r[h.payload_len()..];
        out.push(h);
    }
}

fn text(len: usize) -> Vec<u8> {
    let words = ["alpha ", "beta ", "gamma ", "delta ", "epsilon ", "zeta "];
    let mut out = Vec::with_capacity(len);
    let mut i = 0usize;
    while out.len() < len {
        out.extend_from_slice(words[(i * 7 + i / 3) % words.len()].as_bytes());
        i += 1;
    }
    out.truncate(len);
    out
}

fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

/// Log-like lines with irregular numbers: exercises literal + match + rep0
/// sequences in the optimal parser.
fn log_lines(len: usize) -> Vec<u8> {
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

fn text_with_noise(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut seed = 7;
    while out.len() < len {
        out.extend_from_slice(&log_lines(3000));
        out.extend_from_slice(&noise(500, seed));
        seed += 1;
    }
    out.truncate(len);
    out
}

fn stream_round_trip(data: &[u8], o: &StreamOptions) -> Vec<u8> {
    let mut w = Lzma2Writer::new(Vec::new(), o);
    w.write_all(data).unwrap();
    let packed = w.finish().unwrap();
    let mut out = Vec::new();
    Lzma2Reader::new(&packed[..], o).read_to_end(&mut out).unwrap();
    out
}

// ── Round trips ───────────────────────────────────────────────────────────────

#[test]
fn every_preset_on_irregular_text() {
    let inputs = [
        log_lines(484),
        log_lines(4096),
        log_lines(70_000),
        text_with_noise(200_000),
    ];
    for preset in 0..=9 {
        for dict in [64 << 10, 1 << 20] {
            let mut o = StreamOptions::with_preset(preset).unwrap();
            o.set_dict_size(dict).unwrap();
            for data in &inputs {
                assert_eq!(
                    stream_round_trip(data, &o),
                    *data,
                    "preset {preset} dict {dict} len {}",
                    data.len()
                );
            }
        }
    }
}

#[test]
fn normal_mode_with_either_match_finder() {
    let data = text_with_noise(150_000);
    for mf in [MatchFinder::Hc4, MatchFinder::Bt4] {
        for mode in [Mode::Fast, Mode::Normal] {
            let mut o = StreamOptions::with_preset(6).unwrap();
            o.set_match_finder(mf);
            o.set_mode(mode);
            assert_eq!(stream_round_trip(&data, &o), data, "{mf:?} {mode:?}");
        }
    }
}

#[test]
fn round_trip_every_preset() {
    let data = text(300_000);
    for preset in 0..=9 {
        let mut o = StreamOptions::with_preset(preset).unwrap();
        // Keep the window small so the test stays quick.
        o.set_dict_size(1 << 20).unwrap();
        let packed = compress(&data, &o).unwrap();
        assert!(packed.len() < data.len() / 4, "preset {preset}");
        assert_eq!(decompress(&packed, &o).unwrap(), data, "preset {preset}");
    }
}

#[test]
fn store_mode_writes_only_raw_chunks() {
    let mut o = StreamOptions::new();
    o.set_mode(Mode::Uncompressed);
    let data = text(200_000);
    let packed = compress(&data, &o).unwrap();
    let hs = headers(&packed);
    assert!(hs.iter().all(|h| matches!(h, ChunkHeader::Uncompressed { .. })));
    assert!(hs[0].is_dict_reset());
    assert!(hs[1..].iter().all(|h| !h.is_dict_reset()));
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn empty_input_is_just_the_end_marker() {
    let o = StreamOptions::with_preset(3).unwrap();
    assert_eq!(compress(&[], &o).unwrap(), vec![0x00]);
    assert!(decompress(&[0x00], &o).unwrap().is_empty());
}

#[test]
fn chunk_sizes_stay_in_bounds() {
    let mut o = StreamOptions::with_preset(1).unwrap();
    o.set_dict_size(1 << 20).unwrap();
    let mut data = vec![0u8; 3 * UNCOMPRESSED_SIZE_MAX];
    data.extend(noise(200_000, 7));
    let packed = compress(&data, &o).unwrap();
    let hs = headers(&packed);
    assert!(hs[0].is_dict_reset());
    for h in &hs {
        assert!(h.uncompressed_len() >= 1 && h.uncompressed_len() <= UNCOMPRESSED_SIZE_MAX);
        assert!(h.payload_len() >= 1 && h.payload_len() <= COMPRESSED_SIZE_MAX);
    }
    assert!(hs[1..].iter().all(|h| !h.is_dict_reset()));
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn incompressible_input_falls_back_to_raw() {
    let o = StreamOptions::with_preset(2).unwrap();
    let data = noise(500_000, 42);
    let packed = compress(&data, &o).unwrap();
    let hs = headers(&packed);
    assert!(hs.iter().any(|h| matches!(h, ChunkHeader::Uncompressed { .. })));
    // Three header bytes per 64 KiB raw chunk plus a little slack for
    // compressed chunk headers and the end marker.
    let bound = data.len() + data.len() / COMPRESSED_SIZE_MAX * 6 + 64;
    assert!(packed.len() <= bound, "{} > {}", packed.len(), bound);
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn chunk_after_raw_resets_state() {
    let mut o = StreamOptions::with_preset(0).unwrap();
    o.set_dict_size(1 << 20).unwrap();
    let mut data = noise(100_000, 3);
    data.extend(text(100_000));
    let packed = compress(&data, &o).unwrap();
    let hs = headers(&packed);
    for pair in hs.windows(2) {
        if let (ChunkHeader::Uncompressed { .. }, ChunkHeader::Compressed { reset, .. }) = (pair[0], pair[1]) {
            assert!(reset >= ResetState::State);
        }
    }
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

// ── Preset dictionaries ───────────────────────────────────────────────────────

#[test]
fn preset_dictionary_helps_and_is_required() {
    let dict = text(50_000);
    let data = text(60_000);
    let mut with = StreamOptions::with_preset(3).unwrap();
    with.set_preset_dict(Some(&dict));
    let plain = StreamOptions::with_preset(3).unwrap();

    let a = compress(&data, &with).unwrap();
    let b = compress(&data, &plain).unwrap();
    assert!(a.len() < b.len());
    // No dictionary reset: the stream starts with a props reset.
    assert!(matches!(
        headers(&a)[0],
        ChunkHeader::Compressed { reset: ResetState::Props, .. }
    ));

    assert_eq!(decompress(&a, &with).unwrap(), data);
    let err = decompress(&a, &plain).unwrap_err();
    assert!(matches!(err, Lzma2Error::CorruptedInput(_)));
}

// ── Writer / reader adapters ──────────────────────────────────────────────────

#[test]
fn writer_and_reader_in_small_pieces() {
    let o = StreamOptions::with_preset(4).unwrap();
    let data = text(150_000);
    let mut w = Lzma2Writer::new(Vec::new(), &o);
    for piece in data.chunks(777) {
        w.write_all(piece).unwrap();
    }
    w.flush().unwrap();
    let packed = w.finish().unwrap();

    let mut r = Lzma2Reader::new(&packed[..], &o);
    let mut out = Vec::new();
    let mut buf = [0u8; 333];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert!(r.is_finished());
    assert_eq!(out, data);
}

#[test]
fn props_change_mid_stream() {
    let o = StreamOptions::with_preset(1).unwrap();
    let data = text(100_000);
    let mut w = Lzma2Writer::new(Vec::new(), &o);
    w.write_all(&data[..50_000]).unwrap();
    w.set_props(LzmaProps { lc: 0, lp: 0, pb: 0 }).unwrap();
    w.write_all(&data[50_000..]).unwrap();
    let packed = w.finish().unwrap();

    let hs = headers(&packed);
    assert!(hs.iter().skip(1).any(|h| matches!(
        h,
        ChunkHeader::Compressed { reset: ResetState::Props, props: Some(p), .. } if p.lc == 0
    )));
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn invalid_props_change_is_rejected() {
    let o = StreamOptions::new();
    let mut enc = ChunkEncoder::new(&o);
    let mut out = Vec::new();
    let err = enc.set_props(LzmaProps { lc: 4, lp: 1, pb: 0 }, &mut out).unwrap_err();
    assert!(matches!(err, Lzma2Error::Configuration(_)));
}

#[test]
fn writes_after_finish_fail() {
    let o = StreamOptions::with_preset(0).unwrap();
    let mut enc = ChunkEncoder::new(&o);
    let mut out = Vec::new();
    enc.finish(&mut out).unwrap();
    assert!(matches!(enc.write(b"x", &mut out), Err(Lzma2Error::CancelledOrClosed)));
}

// ── Corruption ────────────────────────────────────────────────────────────────

#[test]
fn corrupted_payload_is_detected_and_sticky() {
    let o = StreamOptions::with_preset(2).unwrap();
    let data = text(100_000);
    let mut packed = compress(&data, &o).unwrap();
    // Damage the range coder's first byte of the first chunk.
    packed[6] = 0xAA;

    let mut r = Lzma2Reader::new(&packed[..], &o);
    let mut out = Vec::new();
    let first: Lzma2Error = r.read_to_end(&mut out).unwrap_err().into();
    assert!(matches!(first, Lzma2Error::CorruptedInput(_)));
    let mut buf = [0u8; 16];
    let again: Lzma2Error = r.read(&mut buf).unwrap_err().into();
    assert!(matches!(again, Lzma2Error::CorruptedInput(_)));
}

#[test]
fn missing_end_marker() {
    let o = StreamOptions::with_preset(0).unwrap();
    let mut packed = compress(&text(10_000), &o).unwrap();
    packed.pop();
    assert!(matches!(
        decompress(&packed, &o),
        Err(Lzma2Error::CorruptedInput(_))
    ));
}
