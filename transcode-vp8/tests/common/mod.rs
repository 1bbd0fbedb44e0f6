//! Shared helpers for integration tests.
//!
//! Besides loading the hex-encoded conformance frames, this builds small
//! synthetic streams with [`BoolEncoder`]: every header field is written at
//! its neutral value and macroblocks carry no residual.

#![allow(dead_code)]

use transcode_vp8::context::FrameContext;
use transcode_vp8::tables::{
    COEFF_UPDATE_PROBS, KF_UV_MODE_PROBS, KF_YMODE_PROBS, MB_SPLIT_PROBS, MODE_CONTEXTS,
    MV_LONG_BITS, MV_PROB_COUNT, MVP_BITS, MVP_IS_SHORT, MVP_SHORT, MVP_SIGN, MV_UPDATE_PROBS,
    SUB_MV_REF_PROBS,
};
use transcode_vp8::tree::{
    write_tree, KF_YMODE_TREE, MB_SPLIT_TREE, MV_REF_TREE, SMALL_MV_TREE, SUB_MV_REF_TREE,
    UV_MODE_TREE,
};
use transcode_vp8::{BoolEncoder, MotionVector, Plane};

/// Route decoder logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decode a hex string, ignoring surrounding whitespace.
pub fn hex(text: &str) -> Vec<u8> {
    let text = text.trim();
    assert!(text.len() % 2 == 0, "odd hex length");
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).expect("invalid hex digit"))
        .collect()
}

/// One frame per non-empty line.
pub fn hex_lines(text: &str) -> Vec<Vec<u8>> {
    text.lines().filter(|l| !l.trim().is_empty()).map(hex).collect()
}

/// Six frames of a 32x24 clip: one keyframe followed by inter frames.
pub fn sequence_32x24() -> Vec<Vec<u8>> {
    hex_lines(include_str!("../data/sequence_32x24.hex"))
}

/// A 32x24 keyframe.
pub fn keyframe_32x24() -> Vec<u8> {
    hex(include_str!("../data/keyframe_32x24.hex"))
}

/// A 640x480 keyframe.
pub fn keyframe_640x480() -> Vec<u8> {
    hex(include_str!("../data/keyframe_640x480.hex"))
}

/// Bytes of `plane` starting at its first visible pixel.
pub fn plane_prefix(plane: &Plane, len: usize) -> &[u8] {
    &plane.data()[plane.offset(0, 0)..][..len]
}

/// Probability that a macroblock has coefficients, as written by
/// [`StreamWriter`]. Every macroblock is coded as skipped.
const PROB_SKIP_FALSE: u8 = 1;

/// Probability of an intra macroblock in inter frames.
const PROB_INTRA: u8 = 200;

/// Probability of the last reference in inter frames.
const PROB_LAST: u8 = 200;

/// Intra macroblock of a synthetic keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraMb {
    /// DC prediction for luma and chroma.
    Dc,
    /// Vertical prediction.
    Vertical,
    /// Horizontal prediction.
    Horizontal,
    /// True motion prediction.
    TrueMotion,
}

impl IntraMb {
    fn leaf(self) -> u8 {
        match self {
            IntraMb::Dc => 0,
            IntraMb::Vertical => 1,
            IntraMb::Horizontal => 2,
            IntraMb::TrueMotion => 3,
        }
    }
}

/// Inter macroblock of a synthetic frame, predicted from last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterMb {
    /// Zero vector.
    Zero,
    /// SPLITMV with 16 explicitly coded sub-block vectors, in 1/8 pel.
    Split4x4([MotionVector; 16]),
}

impl InterMb {
    fn mv(&self) -> MotionVector {
        match self {
            InterMb::Zero => MotionVector::ZERO,
            InterMb::Split4x4(mvs) => mvs[15],
        }
    }

    fn mvs(&self) -> [MotionVector; 16] {
        match self {
            InterMb::Zero => [MotionVector::ZERO; 16],
            InterMb::Split4x4(mvs) => *mvs,
        }
    }

    fn is_split(&self) -> bool {
        matches!(self, InterMb::Split4x4(_))
    }
}

/// Builds frames for a fixed picture size.
#[derive(Debug, Clone, Copy)]
pub struct StreamWriter {
    width: u16,
    height: u16,
    /// Quantizer index written to every frame.
    pub q_index: u8,
    /// Loop filter level written to every frame.
    pub filter_level: u8,
    /// Number of token partitions: 1, 2, 4 or 8.
    pub partitions: usize,
    /// Every coefficient probability is replaced by this value.
    pub coeff_prob: Option<u8>,
    /// Probability updates persist after the frame.
    pub refresh_entropy_probs: bool,
}

impl StreamWriter {
    /// Writer for `width` x `height` frames with loop filtering off.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            q_index: 0,
            filter_level: 0,
            partitions: 1,
            coeff_prob: None,
            refresh_entropy_probs: true,
        }
    }

    /// Macroblock columns.
    pub fn mb_cols(&self) -> usize {
        (self.width as usize + 15) / 16
    }

    /// Macroblock rows.
    pub fn mb_rows(&self) -> usize {
        (self.height as usize + 15) / 16
    }

    /// A keyframe predicting every macroblock with `mode`.
    pub fn keyframe(&self, mode: IntraMb) -> Vec<u8> {
        let modes = vec![mode; self.mb_cols() * self.mb_rows()];
        self.keyframe_with(&modes)
    }

    /// A keyframe with one mode per macroblock in raster order.
    pub fn keyframe_with(&self, modes: &[IntraMb]) -> Vec<u8> {
        assert_eq!(modes.len(), self.mb_cols() * self.mb_rows());
        let mut enc = BoolEncoder::new();
        self.write_header(&mut enc, true);
        for mode in modes {
            enc.write_bool(true, PROB_SKIP_FALSE);
            write_tree(&mut enc, &KF_YMODE_TREE, &KF_YMODE_PROBS, mode.leaf());
            write_tree(&mut enc, &UV_MODE_TREE, &KF_UV_MODE_PROBS, mode.leaf());
        }
        self.assemble(true, enc.finish())
    }

    /// An inter frame where every macroblock is [`InterMb::Zero`].
    pub fn inter_frame(&self) -> Vec<u8> {
        let mbs = vec![InterMb::Zero; self.mb_cols() * self.mb_rows()];
        self.inter_frame_with(&mbs)
    }

    /// An inter frame with one macroblock description per macroblock in
    /// raster order. All macroblocks predict from last.
    pub fn inter_frame_with(&self, mbs: &[InterMb]) -> Vec<u8> {
        let (cols, rows) = (self.mb_cols(), self.mb_rows());
        assert_eq!(mbs.len(), cols * rows);
        let mv_probs = FrameContext::default().mv_probs;

        let mut enc = BoolEncoder::new();
        self.write_header(&mut enc, false);
        let at = |r: isize, c: isize| {
            if r < 0 || c < 0 {
                None
            } else {
                Some(&mbs[r as usize * cols + c as usize])
            }
        };

        for r in 0..rows as isize {
            for c in 0..cols as isize {
                let mb = at(r, c).expect("in frame");
                enc.write_bool(true, PROB_SKIP_FALSE);
                enc.write_bool(true, PROB_INTRA);
                enc.write_bool(false, PROB_LAST);

                let probs = mode_probs([at(r - 1, c), at(r, c - 1), at(r - 1, c - 1)]);
                match mb {
                    InterMb::Zero => write_tree(&mut enc, &MV_REF_TREE, &probs, 0),
                    InterMb::Split4x4(mvs) => {
                        assert!(
                            probs_have_zero_best(&[at(r - 1, c), at(r, c - 1), at(r - 1, c - 1)]),
                            "split macroblocks need zero neighbour vectors"
                        );
                        write_tree(&mut enc, &MV_REF_TREE, &probs, 4);
                        write_tree(&mut enc, &MB_SPLIT_TREE, &MB_SPLIT_PROBS, 3);
                        let above = at(r - 1, c).map_or([MotionVector::ZERO; 16], |m| m.mvs());
                        let left = at(r, c - 1).map_or([MotionVector::ZERO; 16], |m| m.mvs());
                        for k in 0..16 {
                            let left_mv = if k & 3 == 0 { left[k + 3] } else { mvs[k - 1] };
                            let above_mv = if k < 4 { above[k + 12] } else { mvs[k - 4] };
                            let ctx = sub_mv_context(left_mv, above_mv);
                            write_tree(&mut enc, &SUB_MV_REF_TREE, &SUB_MV_REF_PROBS[ctx], 3);
                            write_mv_component(&mut enc, mvs[k].row / 2, &mv_probs[0]);
                            write_mv_component(&mut enc, mvs[k].col / 2, &mv_probs[1]);
                        }
                    }
                }
            }
        }
        self.assemble(false, enc.finish())
    }

    fn write_header(&self, enc: &mut BoolEncoder, key_frame: bool) {
        if key_frame {
            enc.write_flag(false); // color space
            enc.write_flag(false); // clamping
        }
        enc.write_flag(false); // segmentation
        enc.write_flag(false); // normal filter
        enc.write_literal(self.filter_level as u32, 6);
        enc.write_literal(0, 3);
        enc.write_flag(false); // loop filter deltas
        assert!(matches!(self.partitions, 1 | 2 | 4 | 8));
        enc.write_literal(self.partitions.trailing_zeros(), 2);
        enc.write_literal(self.q_index as u32, 7);
        for _ in 0..5 {
            enc.write_optional_signed(0, 4);
        }
        if !key_frame {
            enc.write_flag(false); // refresh golden
            enc.write_flag(false); // refresh altref
            enc.write_literal(0, 2);
            enc.write_literal(0, 2);
            enc.write_flag(false);
            enc.write_flag(false);
        }
        enc.write_flag(self.refresh_entropy_probs);
        if !key_frame {
            enc.write_flag(true); // refresh last
        }
        for plane in COEFF_UPDATE_PROBS.iter() {
            for band in plane.iter() {
                for ctx in band.iter() {
                    for &p in ctx.iter() {
                        enc.write_bool(self.coeff_prob.is_some(), p);
                        if let Some(prob) = self.coeff_prob {
                            enc.write_literal(prob as u32, 8);
                        }
                    }
                }
            }
        }
        enc.write_flag(true); // mb_no_coeff_skip
        enc.write_literal(PROB_SKIP_FALSE as u32, 8);
        if !key_frame {
            enc.write_literal(PROB_INTRA as u32, 8);
            enc.write_literal(PROB_LAST as u32, 8);
            enc.write_literal(128, 8);
            enc.write_flag(false);
            enc.write_flag(false);
            for probs in MV_UPDATE_PROBS.iter() {
                for &p in probs.iter() {
                    enc.write_bool(false, p);
                }
            }
        }
    }

    /// Prefix the first partition with the uncompressed header and append the
    /// token partitions.
    fn assemble(&self, key_frame: bool, first: Vec<u8>) -> Vec<u8> {
        let size = first.len() as u32;
        let raw = (size << 5) | (1 << 4) | (!key_frame as u32);
        let mut out = vec![raw as u8, (raw >> 8) as u8, (raw >> 16) as u8];
        if key_frame {
            out.extend_from_slice(&[0x9d, 0x01, 0x2a]);
            out.extend_from_slice(&self.width.to_le_bytes());
            out.extend_from_slice(&self.height.to_le_bytes());
        }
        out.extend_from_slice(&first);

        let mut tokens = BoolEncoder::new();
        tokens.write_literal(0, 32);
        let tokens = tokens.finish();
        for _ in 1..self.partitions {
            out.extend_from_slice(&(tokens.len() as u32).to_le_bytes()[..3]);
        }
        for _ in 0..self.partitions {
            out.extend_from_slice(&tokens);
        }
        out
    }
}

/// Overwrite the size of token partition `index` (all but the last carry
/// one) in a frame built by [`StreamWriter`].
pub fn set_partition_size(frame: &mut [u8], index: usize, size: u32) {
    let raw = frame[0] as u32 | (frame[1] as u32) << 8 | (frame[2] as u32) << 16;
    let header = if raw & 1 == 0 { 10 } else { 3 };
    let at = header + (raw >> 5) as usize + 3 * index;
    frame[at..at + 3].copy_from_slice(&size.to_le_bytes()[..3]);
}

/// Inter mode probabilities for a macroblock whose above, left and
/// above-left neighbours are given, all predicted from last.
fn mode_probs(neighbours: [Option<&InterMb>; 3]) -> [u8; 4] {
    let weights = [2u8, 2, 1];
    let mut mvs = [MotionVector::ZERO; 4];
    let mut counts = [0u8; 4];
    let mut n = 0;
    for (nb, &w) in neighbours.iter().zip(weights.iter()) {
        let Some(nb) = nb else { continue };
        let mv = nb.mv();
        if mv.is_zero() {
            counts[0] += w;
            continue;
        }
        if mv != mvs[n] {
            n += 1;
            mvs[n] = mv;
        }
        counts[n] += w;
    }
    if counts[3] != 0 && mvs[n] == mvs[1] {
        counts[1] += 1;
    }
    counts[3] = neighbours
        .iter()
        .zip(weights.iter())
        .filter(|(nb, _)| nb.map_or(false, |m| m.is_split()))
        .map(|(_, &w)| w)
        .sum();
    if counts[2] > counts[1] {
        counts.swap(1, 2);
    }

    let mut probs = [0u8; 4];
    for (i, p) in probs.iter_mut().enumerate() {
        *p = MODE_CONTEXTS[counts[i] as usize][i];
    }
    probs
}

/// Coded split vectors are relative to the best candidate; keep that zero.
fn probs_have_zero_best(neighbours: &[Option<&InterMb>; 3]) -> bool {
    neighbours.iter().flatten().all(|m| m.mv().is_zero())
}

fn sub_mv_context(left: MotionVector, above: MotionVector) -> usize {
    match (left == above, left.is_zero(), above.is_zero()) {
        (true, true, _) => 4,
        (true, false, _) => 3,
        (false, _, true) => 2,
        (false, true, false) => 1,
        _ => 0,
    }
}

/// Write one vector component in quarter pel.
fn write_mv_component(enc: &mut BoolEncoder, v: i16, probs: &[u8; MV_PROB_COUNT]) {
    let x = v.unsigned_abs();
    if x < 8 {
        enc.write_bool(false, probs[MVP_IS_SHORT]);
        write_tree(enc, &SMALL_MV_TREE, &probs[MVP_SHORT..MVP_BITS], x as u8);
    } else {
        enc.write_bool(true, probs[MVP_IS_SHORT]);
        for i in 0..3 {
            enc.write_bool((x >> i) & 1 != 0, probs[MVP_BITS + i]);
        }
        for i in (4..MV_LONG_BITS).rev() {
            enc.write_bool((x >> i) & 1 != 0, probs[MVP_BITS + i]);
        }
        if x & 0xfff0 != 0 {
            enc.write_bool((x >> 3) & 1 != 0, probs[MVP_BITS + 3]);
        }
    }
    if x != 0 {
        enc.write_bool(v < 0, probs[MVP_SIGN]);
    }
}
