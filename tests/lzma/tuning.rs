// Integration tests for StreamOptions::find_best_props.

use lzma2::{compress, decompress, StreamOptions};

fn fixed_records(n: usize) -> Vec<u8> {
    // 4-byte records whose low byte is almost constant: position bits pay off.
    let mut out = Vec::with_capacity(n * 4);
    for i in 0..n as u32 {
        out.extend_from_slice(&(i.wrapping_mul(2654435761) >> 8 | 0x55).to_le_bytes());
    }
    out
}

#[test]
fn best_props_are_never_worse_than_default() {
    let sample = fixed_records(20_000);
    let mut o = StreamOptions::with_preset(3).unwrap();
    o.set_dict_size(64 * 1024).unwrap();
    let default_size = compress(&sample, &o).unwrap().len();

    let best = o.find_best_props(&sample).unwrap();
    assert!(best <= default_size);
    assert!(o.props().lc + o.props().lp <= 4);
    assert_eq!(decompress(&compress(&sample, &o).unwrap(), &o).unwrap(), sample);
}

#[test]
fn tuning_keeps_the_dictionary_size() {
    let mut o = StreamOptions::with_preset(1).unwrap();
    let dict = o.dict_size();
    o.find_best_props(b"tiny sample").unwrap();
    assert_eq!(o.dict_size(), dict);
}
