#![no_main]

//! Fuzz target for the VP8 boolean decoder.
//!
//! Reads must never panic, and must stay in step with the encoder.

use libfuzzer_sys::fuzz_target;
use transcode_vp8::{BoolDecoder, BoolEncoder};

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }

    // Arbitrary data: read well past the end
    let mut bd = BoolDecoder::new(data);
    for (i, &p) in data.iter().cycle().take(data.len() * 2 + 64).enumerate() {
        if i % 7 == 0 {
            let _ = bd.read_literal(p % 17);
        } else {
            let _ = bd.read_bool(p);
        }
    }
    if data.is_empty() {
        assert!(bd.is_corrupt());
    }

    // Round trip: pairs of (probability, bit)
    let symbols: Vec<(u8, bool)> = data
        .chunks_exact(2)
        .map(|c| (c[0].max(1), c[1] & 1 == 1))
        .collect();
    let mut enc = BoolEncoder::new();
    for &(prob, bit) in &symbols {
        enc.write_bool(bit, prob);
    }
    let encoded = enc.finish();
    let mut bd = BoolDecoder::new(&encoded);
    for &(prob, bit) in &symbols {
        assert_eq!(bd.read_bool(prob), bit);
    }
    assert!(!bd.is_corrupt());
});
