#![no_main]

//! Fuzz target for VP8 frame decoding.
//!
//! Feeds arbitrary packets through a decoder, optionally behind a valid
//! keyframe so inter frame paths are reached.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transcode_vp8::{Vp8Decoder, Vp8DecoderConfig};

#[derive(Arbitrary, Debug)]
struct Vp8Input {
    data: Vec<u8>,
    test_mode: Vp8TestMode,
}

#[derive(Arbitrary, Debug)]
enum Vp8TestMode {
    /// Single frame decode attempt
    SingleFrame,
    /// Input split into several packets
    MultiDecode,
    /// Same packet decoded twice must give the same result
    Repeat,
}

fuzz_target!(|input: Vp8Input| {
    // Limit input size to prevent OOM
    if input.data.len() > 1024 * 1024 {
        return;
    }

    // Keep allocations small; dimensions come straight from the input
    let config = Vp8DecoderConfig {
        max_width: 512,
        max_height: 512,
    };
    let Ok(mut decoder) = Vp8Decoder::with_config(config) else {
        return;
    };

    match input.test_mode {
        Vp8TestMode::SingleFrame => {
            let _ = decoder.decode(&input.data);
        }
        Vp8TestMode::MultiDecode => {
            let chunk_size = input.data.len() / 4;
            if chunk_size > 0 {
                for chunk in input.data.chunks(chunk_size) {
                    if let Ok(frame) = decoder.decode(chunk) {
                        let _ = frame.to_i420();
                    }
                }
            }
        }
        Vp8TestMode::Repeat => {
            let first = decoder.decode(&input.data).map(|f| f.to_i420());
            let mut fresh = Vp8Decoder::with_config(decoder.config().clone())
                .expect("config already validated");
            let second = fresh.decode(&input.data).map(|f| f.to_i420());
            assert_eq!(first, second);
        }
    }
});
