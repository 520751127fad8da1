// Integration tests for src/frame/chunk.rs: header layout and parsing.
//
// Coverage:
//   - control byte layout of raw and compressed headers
//   - size fields at their limits (1 and 64 KiB raw, 2 MiB uncompressed)
//   - props byte present exactly for reset >= Props
//   - invalid control bytes and props bytes are CorruptedInput
//   - truncated headers are CorruptedInput
//   - dict-reset detection used to split parallel groups

use lzma2::frame::{ChunkHeader, LzmaProps, ResetState, COMPRESSED_SIZE_MAX, UNCOMPRESSED_SIZE_MAX};
use lzma2::Lzma2Error;

fn encode(h: &ChunkHeader) -> Vec<u8> {
    let mut v = Vec::new();
    h.write_to(&mut v);
    assert_eq!(v.len(), h.encoded_len());
    v
}

fn parse(bytes: &[u8]) -> Result<ChunkHeader, Lzma2Error> {
    let mut r = bytes;
    ChunkHeader::read_from(&mut r)
}

#[test]
fn end_marker_is_single_zero() {
    assert_eq!(encode(&ChunkHeader::End), vec![0x00]);
    assert_eq!(parse(&[0x00]).unwrap(), ChunkHeader::End);
}

#[test]
fn raw_headers_at_size_limits() {
    let small = ChunkHeader::Uncompressed { dict_reset: true, size: 1 };
    assert_eq!(encode(&small), vec![0x01, 0x00, 0x00]);
    let big = ChunkHeader::Uncompressed {
        dict_reset: false,
        size: COMPRESSED_SIZE_MAX,
    };
    assert_eq!(encode(&big), vec![0x02, 0xFF, 0xFF]);
    assert_eq!(parse(&encode(&big)).unwrap(), big);
}

#[test]
fn compressed_header_with_props() {
    let h = ChunkHeader::Compressed {
        reset: ResetState::Dict,
        uncompressed_size: UNCOMPRESSED_SIZE_MAX,
        compressed_size: 300,
        props: Some(LzmaProps::DEFAULT),
    };
    let bytes = encode(&h);
    assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0x01, 0x2B, 0x5D]);
    assert_eq!(parse(&bytes).unwrap(), h);
    assert!(h.is_dict_reset());
}

#[test]
fn compressed_header_without_props() {
    for (reset, control) in [(ResetState::Continue, 0x80u8), (ResetState::State, 0xA0)] {
        let h = ChunkHeader::Compressed {
            reset,
            uncompressed_size: 0x1_0000 + 5,
            compressed_size: 1,
            props: None,
        };
        let bytes = encode(&h);
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], control | 0x01);
        assert_eq!(parse(&bytes).unwrap(), h);
        assert!(!h.is_dict_reset());
    }
}

#[test]
fn props_reset_without_dict_reset() {
    let h = ChunkHeader::Compressed {
        reset: ResetState::Props,
        uncompressed_size: 10,
        compressed_size: 10,
        props: Some(LzmaProps { lc: 0, lp: 2, pb: 0 }),
    };
    let bytes = encode(&h);
    assert_eq!(bytes[0] & 0xE0, 0xC0);
    assert_eq!(parse(&bytes).unwrap(), h);
    assert!(!h.is_dict_reset());
}

#[test]
fn invalid_control_bytes() {
    for control in [0x03u8, 0x10, 0x7F] {
        let err = parse(&[control, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Lzma2Error::CorruptedInput(_)), "control {control:#x}");
    }
}

#[test]
fn invalid_props_bytes() {
    // 225 and up cannot encode lc, lp, pb.
    for props in [225u8, 0xFF] {
        let err = parse(&[0xE0, 0, 0, 0, 0, props]).unwrap_err();
        assert!(matches!(err, Lzma2Error::CorruptedInput(_)));
    }
    // lc=4, lp=1 encodes fine but lc + lp exceeds 4.
    let byte = (2 * 5 + 1) * 9 + 4;
    assert!(matches!(
        parse(&[0xE0, 0, 0, 0, 0, byte as u8]).unwrap_err(),
        Lzma2Error::CorruptedInput(_)
    ));
}

#[test]
fn truncated_headers() {
    for bytes in [&[][..], &[0x01, 0x00][..], &[0xE0, 0, 0, 0][..], &[0xE0, 0, 0, 0, 0][..]] {
        let err = parse(bytes).unwrap_err();
        assert!(matches!(err, Lzma2Error::CorruptedInput(_)), "{bytes:?}");
    }
}
