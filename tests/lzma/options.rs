// Integration tests for src/options.rs: presets, property validation,
// memory estimates and the textual summary.

use lzma2::options::{DICT_SIZE_MAX, DICT_SIZE_MIN, NICE_LEN_MAX, NICE_LEN_MIN};
use lzma2::{compress, decompress, LzmaProps, Lzma2Error, MatchFinder, Mode, StreamOptions};

const KB: usize = 1 << 10;
const MB: usize = 1 << 20;

#[test]
fn preset_dictionary_sizes() {
    let expect = [256 * KB, MB, 2 * MB, 4 * MB, 4 * MB, 8 * MB, 8 * MB, 16 * MB, 32 * MB, 64 * MB];
    for (preset, &size) in expect.iter().enumerate() {
        let o = StreamOptions::with_preset(preset as u32).unwrap();
        assert_eq!(o.dict_size(), size, "preset {preset}");
        assert_eq!(o.props(), LzmaProps::DEFAULT);
    }
}

#[test]
fn preset_engines() {
    for preset in 0..=3 {
        let o = StreamOptions::with_preset(preset).unwrap();
        assert_eq!(o.mode(), Mode::Fast);
        assert_eq!(o.match_finder(), MatchFinder::Hc4);
    }
    let nice = [16, 32, 64, 64, 64, 64];
    for preset in 4..=9 {
        let o = StreamOptions::with_preset(preset).unwrap();
        assert_eq!(o.mode(), Mode::Normal);
        assert_eq!(o.match_finder(), MatchFinder::Bt4);
        assert_eq!(o.nice_len(), nice[preset as usize - 4]);
        assert_eq!(o.depth_limit(), 0);
    }
    assert!(matches!(StreamOptions::with_preset(10), Err(Lzma2Error::Configuration(_))));
}

#[test]
fn set_preset_keeps_preset_dictionary() {
    let mut o = StreamOptions::new();
    o.set_preset_dict(Some(&b"history"[..]));
    o.set_preset(2).unwrap();
    assert_eq!(o.preset_dict(), Some(&b"history"[..]));
    o.set_preset_dict(Some(&b""[..]));
    assert_eq!(o.preset_dict(), None);
}

#[test]
fn lc_lp_sum_is_limited() {
    let mut o = StreamOptions::new();
    assert!(matches!(o.set_lc_lp(4, 1), Err(Lzma2Error::Configuration(_))));
    assert!(o.set_lc_lp(4, 0).is_ok());
    assert!(o.set_lc_lp(0, 4).is_ok());
    assert!(o.set_pb(5).is_err());
    assert!(o.set_pb(4).is_ok());
    // Failed setters leave the options untouched.
    assert_eq!(o.props(), LzmaProps { lc: 0, lp: 4, pb: 4 });
}

#[test]
fn props_byte_helpers() {
    let mut o = StreamOptions::new();
    assert_eq!(o.props_byte(), 0x5D);
    o.set_props_byte(0).unwrap();
    assert_eq!(o.props(), LzmaProps { lc: 0, lp: 0, pb: 0 });
    o.set_props_byte(216).unwrap();
    assert_eq!(o.props(), LzmaProps { lc: 0, lp: 4, pb: 4 });
    assert_eq!(o.props_byte(), 216);
    // lc = 8
    assert!(o.set_props_byte(224).is_err());
    assert!(o.set_props_byte(225).is_err());
    // lc = 4, lp = 1, pb = 0
    assert!(o.set_props_byte(13).is_err());
}

#[test]
fn range_checks() {
    let mut o = StreamOptions::new();
    assert!(o.set_dict_size(DICT_SIZE_MIN - 1).is_err());
    assert!(o.set_dict_size(DICT_SIZE_MAX + 1).is_err());
    assert!(o.set_dict_size(DICT_SIZE_MIN).is_ok());
    assert!(o.set_nice_len(NICE_LEN_MIN - 1).is_err());
    assert!(o.set_nice_len(NICE_LEN_MAX + 1).is_err());
    assert!(o.set_nice_len(NICE_LEN_MAX).is_ok());
}

#[test]
fn odd_settings_round_trip() {
    let data = b"0123456789abcdef".repeat(5000);
    let mut o = StreamOptions::with_preset(5).unwrap();
    o.set_dict_size(DICT_SIZE_MIN).unwrap();
    o.set_lc_lp(0, 4).unwrap();
    o.set_pb(4).unwrap();
    o.set_nice_len(NICE_LEN_MIN).unwrap();
    o.set_match_finder(MatchFinder::Hc4);
    o.set_depth_limit(1);
    let packed = compress(&data, &o).unwrap();
    assert_eq!(decompress(&packed, &o).unwrap(), data);

    o.set_mode(Mode::Fast);
    o.set_match_finder(MatchFinder::Bt4);
    let packed = compress(&data, &o).unwrap();
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn memory_estimates_grow_with_the_dictionary() {
    let small = StreamOptions::with_preset(0).unwrap();
    let large = StreamOptions::with_preset(9).unwrap();
    assert!(small.encoder_memory_usage() < large.encoder_memory_usage());
    assert!(small.decoder_memory_usage() < large.decoder_memory_usage());
    // The decoder needs at least its dictionary.
    assert!(large.decoder_memory_usage() >= 64 * 1024, "KiB");
    assert!(large.encoder_memory_usage() > large.decoder_memory_usage());
}

#[test]
fn display_summary() {
    let mut o = StreamOptions::new();
    assert_eq!(o.to_string(), "23");
    o.set_dict_size(3 * MB).unwrap();
    o.set_lc_lp(4, 0).unwrap();
    o.set_mode(Mode::Fast);
    assert_eq!(o.to_string(), "3M:lc4 FAST");
    o.set_dict_size(5000).unwrap();
    o.set_pb(0).unwrap();
    o.set_mode(Mode::Uncompressed);
    assert_eq!(o.to_string(), "5000:lc4:pb0 STORE");
}
