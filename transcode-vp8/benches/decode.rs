//! VP8 decoder benchmarks.
//!
//! Covers the entropy decoder, the inverse transforms, sub-pixel prediction
//! and whole-stream decoding of the conformance clip.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use transcode_vp8::frame::Plane;
use transcode_vp8::inter::{predict_block, InterpFilter};
use transcode_vp8::transform::{idct4x4, iwht4x4};
use transcode_vp8::{BoolDecoder, BoolEncoder, MotionVector, Vp8Decoder};

fn hex_frames(text: &str) -> Vec<Vec<u8>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            (0..l.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&l[i..i + 2], 16).expect("hex"))
                .collect()
        })
        .collect()
}

// ============================================================================
// Entropy Decoding
// ============================================================================

fn bench_bool_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("bool_decoder");

    for prob in [1u8, 128, 250] {
        let mut enc = BoolEncoder::new();
        let mut state = 0x2545_f491u32;
        for _ in 0..100_000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            enc.write_bool(state as u8 >= prob, prob);
        }
        let data = enc.finish();

        group.throughput(Throughput::Elements(100_000));
        group.bench_with_input(BenchmarkId::from_parameter(prob), &data, |b, data| {
            b.iter(|| {
                let mut bd = BoolDecoder::new(black_box(data));
                let mut ones = 0u32;
                for _ in 0..100_000 {
                    ones += bd.read_bool(prob) as u32;
                }
                ones
            });
        });
    }

    group.finish();
}

// ============================================================================
// Transforms and Prediction
// ============================================================================

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    let input: [i32; 16] = std::array::from_fn(|i| (i as i32 * 37 % 255) - 127);

    group.bench_function("idct4x4", |b| {
        let mut out = [0i32; 16];
        b.iter(|| idct4x4(black_box(&input), &mut out));
    });
    group.bench_function("iwht4x4", |b| {
        let mut out = [0i32; 16];
        b.iter(|| iwht4x4(black_box(&input), &mut out));
    });

    group.finish();
}

fn bench_inter_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("inter_prediction");
    let mut reference = Plane::new(64, 64, 32).expect("plane");
    for (i, px) in reference.data_mut().iter_mut().enumerate() {
        *px = (i * 7 % 251) as u8;
    }
    let mut dst = Plane::new(64, 64, 32).expect("plane");

    let cases = [
        ("full_pel", MotionVector::new(16, -24), InterpFilter::SixTap),
        ("sixtap", MotionVector::new(5, -3), InterpFilter::SixTap),
        ("bilinear", MotionVector::new(5, -3), InterpFilter::Bilinear),
    ];
    for (name, mv, filter) in cases {
        group.bench_function(BenchmarkId::new("16x16", name), |b| {
            b.iter(|| predict_block(&reference, &mut dst, 16, 16, 16, 16, black_box(mv), filter));
        });
    }

    group.finish();
}

// ============================================================================
// Stream Decoding
// ============================================================================

fn bench_decode_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.sample_size(50);

    let frames = hex_frames(include_str!("../tests/data/sequence_32x24.hex"));
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("sequence_32x24", |b| {
        b.iter(|| {
            let mut decoder = Vp8Decoder::new();
            for frame in &frames {
                let decoded = decoder.decode(black_box(frame)).expect("decode");
                black_box(decoded.y().row(0)[0]);
            }
        });
    });

    let keyframe = hex_frames(include_str!("../tests/data/keyframe_640x480.hex"));
    group.throughput(Throughput::Elements(1));
    group.bench_function("keyframe_640x480", |b| {
        let mut decoder = Vp8Decoder::new();
        b.iter(|| {
            let decoded = decoder.decode(black_box(&keyframe[0])).expect("decode");
            black_box(decoded.y().row(0)[0]);
        });
    });

    group.finish();
}

criterion_group!(entropy_benches, bench_bool_decoder);
criterion_group!(dsp_benches, bench_transforms, bench_inter_prediction);
criterion_group!(stream_benches, bench_decode_stream);
criterion_main!(entropy_benches, dsp_benches, stream_benches);
