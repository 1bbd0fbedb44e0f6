//! Decoding against reference output of the libvpx decoder.

mod common;

use common::{hex, init_tracing, keyframe_32x24, keyframe_640x480, plane_prefix, sequence_32x24};
use pretty_assertions::assert_eq;
use transcode_vp8::{Vp8Decoder, Vp8Error};

/// First stride of each plane after every frame of the 32x24 sequence:
/// the visible row, its right border and the left border of the next row.
#[rustfmt::skip]
const SEQUENCE_ROWS: [(&str, &str, &str); 6] = [
    (
        "b66065dbaa3dafd75b65dba939afcf575ad2a63db6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f817d7e7f7e7e7f807e82a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a284848484848484848484848484848484",
        "807e7f7f7f807f7e7f807e7f7f7e6163636363636363636363636363636363637d7d7d7d7d7d7d7d7d7d7d7d7d7d7d7d",
    ),
    (
        "b86165dba93db0d85b65dba93aaed15659d1a53cb6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f807e7e807e7e7e7f7f83a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a184848484848484848484848484848484",
        "7f7f807e7f807f7e7f807e7f807f6162626262626262626262626262626262627e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
    ),
    (
        "b86165dba93db0d85b65dba93bafd15559d1a53cb6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f817d7e807e7e7e7f7f83a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a184848484848484848484848484848484",
        "7f7f807e7f807f7e7f807e7f817e6063636363636363636363636363636363637e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
    ),
    (
        "b86165dba93db0d85b65dba93bafd15559d1a53cb6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f807e7e807e7e7e7f7f83a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a184848484848484848484848484848484",
        "7f7f807e7f807f7e7f807e7f817e6063636363636363636363636363636363637e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
    ),
    (
        "b86165dba93db0d85b65dba93bafd15559d1a53cb6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f817d7e807e7e7e7f7f83a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a184848484848484848484848484848484",
        "7f7f807e7f807f7e7f807e7f817e6063636363636363636363636363636363637e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
    ),
    (
        "b86165dba93db0d85b65dba93bafd15559d1a53cb6d85a68d8ab3cafda5a67b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b5b51010101010101010101010101010101010101010101010101010101010101010",
        "817e7f7e7f807e7e807e7e7e7f7f83a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a184848484848484848484848484848484",
        "7f7f807e7f807f7e7f807e7f817e6063636363636363636363636363636363637e7e7e7e7e7e7e7e7e7e7e7e7e7e7e7e",
    ),
];

#[test]
fn test_sequence_matches_reference_rows() {
    let frames = sequence_32x24();
    assert_eq!(frames.len(), SEQUENCE_ROWS.len());
    init_tracing();
    let mut decoder = Vp8Decoder::new();

    for (i, (frame, (y, u, v))) in frames.iter().zip(SEQUENCE_ROWS.iter()).enumerate() {
        let decoded = decoder
            .decode(frame)
            .unwrap_or_else(|e| panic!("frame {}: {}", i, e));
        assert_eq!(decoded.is_keyframe(), i == 0, "frame {}", i);
        assert!(decoded.is_shown());
        assert!(!decoded.is_corrupt());
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        let y_plane = decoded.y();
        let u_plane = decoded.u();
        let v_plane = decoded.v();
        assert_eq!(plane_prefix(y_plane, y_plane.stride()), &hex(y)[..], "luma, frame {}", i);
        assert_eq!(plane_prefix(u_plane, u_plane.stride()), &hex(u)[..], "cb, frame {}", i);
        assert_eq!(plane_prefix(v_plane, v_plane.stride()), &hex(v)[..], "cr, frame {}", i);
    }
    assert_eq!(decoder.frame_count(), 6);
}

#[test]
fn test_keyframes_decode() {
    for (data, dims) in [(keyframe_640x480(), (640, 480)), (keyframe_32x24(), (32, 24))] {
        let mut decoder = Vp8Decoder::new();
        let frame = decoder.decode(&data).unwrap();
        assert!(frame.is_keyframe());
        assert!(!frame.is_corrupt());
        assert_eq!((frame.width(), frame.height()), dims);
        assert_eq!(decoder.dimensions(), dims);
        assert!(!decoder.is_awaiting_keyframe());
    }
}

#[test]
fn test_keyframe_output_is_independent_of_history() {
    for data in [keyframe_640x480(), keyframe_32x24()] {
        let mut fresh = Vp8Decoder::new();
        let expected = fresh.decode(&data).unwrap().to_i420();

        // Leave probabilities, references and buffers from another stream behind
        let mut decoder = Vp8Decoder::new();
        for frame in sequence_32x24() {
            decoder.decode(&frame).unwrap();
        }
        let frame = decoder.decode(&data).unwrap();
        assert!(!frame.is_corrupt());
        let pixels = frame.to_i420();
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        assert_eq!(pixels.len(), w * h + 2 * ((w + 1) / 2) * ((h + 1) / 2));
        assert_eq!(pixels, expected);
    }
}

#[test]
fn test_truncated_keyframe_is_rejected() {
    let mut decoder = Vp8Decoder::new();
    let err = decoder.decode(&hex("5043009d012a8002e00102c708")).unwrap_err();
    assert!(matches!(err, Vp8Error::CorruptKeyframe { .. }), "{:?}", err);
    assert!(err.requires_keyframe());
    assert!(decoder.is_awaiting_keyframe());
}

#[test]
fn test_missing_start_code_is_unsupported() {
    let mut decoder = Vp8Decoder::new();
    let err = decoder.decode(&[0u8; 100]).unwrap_err();
    assert!(matches!(err, Vp8Error::UnsupportedFeature { .. }), "{:?}", err);
}

#[test]
fn test_decoding_is_deterministic() {
    let frames = sequence_32x24();
    let decode_all = || {
        let mut decoder = Vp8Decoder::new();
        frames
            .iter()
            .map(|f| decoder.decode(f).map(|frame| frame.to_i420()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    };
    assert_eq!(decode_all(), decode_all());
}

#[test]
fn test_recovers_at_next_keyframe() {
    let frames = sequence_32x24();
    let mut decoder = Vp8Decoder::new();

    // Inter frames are dropped until the keyframe arrives
    assert_eq!(decoder.decode(&frames[1]).unwrap_err(), Vp8Error::MissingKeyframe);
    decoder.decode(&frames[0]).unwrap();
    decoder.decode(&frames[1]).unwrap();

    // A damaged keyframe stops inter decoding until a good one arrives
    assert!(decoder.decode(&hex("5043009d012a8002e00102c708")).is_err());
    assert_eq!(decoder.decode(&frames[2]).unwrap_err(), Vp8Error::MissingKeyframe);

    let mut fresh = Vp8Decoder::new();
    let expected = fresh.decode(&frames[0]).unwrap().to_i420();
    assert_eq!(decoder.decode(&frames[0]).unwrap().to_i420(), expected);
}

#[test]
fn test_truncated_inter_frame_marks_reference_corrupt() {
    init_tracing();
    let frames = sequence_32x24();
    let mut decoder = Vp8Decoder::new();
    decoder.decode(&frames[0]).unwrap();

    let truncated = &frames[1][..frames[1].len() / 2];
    let err = decoder.decode(truncated).unwrap_err();
    assert!(matches!(err, Vp8Error::CorruptFrame { .. }), "{:?}", err);
    assert!(!decoder.is_awaiting_keyframe());

    // Later frames still decode but inherit the damage
    let frame = decoder.decode(&frames[2]).unwrap();
    assert!(frame.is_corrupt());

    // Until a keyframe clears it
    let frame = decoder.decode(&frames[0]).unwrap();
    assert!(!frame.is_corrupt());
}
