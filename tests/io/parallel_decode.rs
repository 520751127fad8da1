// Integration tests for the parallel decoder frontend (src/io/par_reader.rs).
//
// Coverage:
//   - streams from every encoder decode with the parallel reader
//   - many groups with a tiny output cap and few workers
//   - small caller buffers
//   - a corrupted group surfaces as WorkerFailure with the group's task id
//   - header corruption seen by the frontend is CorruptedInput
//   - truncated streams

use std::io::Read;

use lzma2::frame::Lzma2Writer;
use lzma2::io::ParallelReader;
use lzma2::{compress, decompress, DictMode, Lzma2Error};

use super::common::{chunk_offsets, noise, parallel_options, single_stream, text, KB};

#[test]
fn decodes_single_stream_output() {
    let o = parallel_options(3, 64 * KB, 4, 64 * KB, DictMode::None);
    let data = text(400 * KB);
    let mut w = Lzma2Writer::new(Vec::new(), &single_stream(&o));
    std::io::Write::write_all(&mut w, &data).unwrap();
    let packed = w.finish().unwrap();
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn decodes_every_dictionary_mode() {
    let mut data = text(300 * KB);
    data.extend(noise(70 * KB, 11));
    for mode in [DictMode::None, DictMode::Sync, DictMode::Async] {
        let o = parallel_options(1, 64 * KB, 3, 64 * KB, mode);
        let packed = compress(&data, &o).unwrap();
        assert_eq!(decompress(&packed, &o).unwrap(), data, "{mode:?}");
    }
}

#[test]
fn many_groups_tiny_cap() {
    let o = parallel_options(0, 64 * KB, 2, 64 * KB, DictMode::None);
    let data = text(40 * 64 * KB + 99);
    let packed = compress(&data, &o).unwrap();

    let mut r = ParallelReader::with_output_cap(&packed[..], &o, 1).unwrap();
    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn small_reads() {
    let o = parallel_options(1, 64 * KB, 4, 64 * KB, DictMode::None);
    let data = text(500 * KB);
    let packed = compress(&data, &o).unwrap();
    let mut r = ParallelReader::new(&packed[..], &o).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    // Reads past the end keep returning 0.
    assert_eq!(r.read(&mut buf).unwrap(), 0);
}

#[test]
fn corrupted_group_reports_its_task() {
    let o = parallel_options(2, 64 * KB, 3, 64 * KB, DictMode::None);
    let data = text(4 * 64 * KB);
    let mut packed = compress(&data, &o).unwrap();

    // First chunk of the third group: break its range coder init byte.
    let (pos, header) = chunk_offsets(&packed)
        .into_iter()
        .filter(|(_, h)| h.is_dict_reset())
        .nth(2)
        .unwrap();
    packed[pos + header.encoded_len()] = 0x55;

    let mut r = ParallelReader::new(&packed[..], &o).unwrap();
    let mut out = Vec::new();
    let err: Lzma2Error = r.read_to_end(&mut out).unwrap_err().into();
    match &err {
        Lzma2Error::WorkerFailure { task_id, .. } => assert_eq!(*task_id, 2),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(err.root_cause(), Lzma2Error::CorruptedInput(_)));
    // Bytes before the broken group were delivered intact.
    assert!(out.len() <= 2 * 64 * KB);
    assert_eq!(out, data[..out.len()]);

    // The failure is sticky.
    let again: Lzma2Error = r.read(&mut [0u8; 8]).unwrap_err().into();
    assert!(matches!(again.root_cause(), Lzma2Error::CorruptedInput(_)));
}

#[test]
fn invalid_header_is_corrupted_input() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::None);
    let mut packed = compress(&text(200 * KB), &o).unwrap();
    let (pos, _) = chunk_offsets(&packed)[1];
    packed[pos] = 0x42;
    let err = decompress(&packed, &o).unwrap_err();
    assert!(matches!(err.root_cause(), Lzma2Error::CorruptedInput(_)));
}

#[test]
fn truncated_stream() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::None);
    let packed = compress(&text(200 * KB), &o).unwrap();
    for cut in [1, packed.len() / 2, packed.len() - 1] {
        let err = decompress(&packed[..cut], &o).unwrap_err();
        assert!(matches!(err.root_cause(), Lzma2Error::CorruptedInput(_)), "cut {cut}");
    }
}

#[test]
fn first_chunk_must_reset_dictionary() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::None);
    // Raw chunk without dictionary reset.
    let stream = [0x02, 0x00, 0x00, b'a', 0x00];
    let err = decompress(&stream, &o).unwrap_err();
    assert!(matches!(err.root_cause(), Lzma2Error::CorruptedInput(_)));
}
