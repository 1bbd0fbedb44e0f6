//! Motion compensated prediction.
//!
//! Vectors are in 1/8 pel of the plane being predicted: the integer part
//! selects the source pixel and the low three bits the filter phase. Reads
//! outside the reference are clamped to its edge, which matches reading the
//! replicated border.

use crate::frame::Plane;
use crate::tables::{BILINEAR_FILTERS, SIXTAP_FILTERS};
use crate::MotionVector;

/// Largest predicted block.
const MAX_BLOCK: usize = 16;

/// Source window for the largest block including filter taps.
const MAX_WINDOW: usize = MAX_BLOCK + 5;

/// Sub-pixel interpolation filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpFilter {
    /// Six-tap filter (version 0).
    #[default]
    SixTap,
    /// Bilinear filter (versions 1-3).
    Bilinear,
}

/// Copy a `w` x `h` window of `reference` with its top-left corner at
/// (`x`, `y`) into `out`, clamping coordinates to the plane.
fn fetch_window(reference: &Plane, x: isize, y: isize, w: usize, h: usize, out: &mut [u8]) {
    let max_x = reference.width() as isize - 1;
    let max_y = reference.height() as isize - 1;
    let data = reference.data();
    let inside_x = x >= 0 && x + w as isize - 1 <= max_x;

    for (r, dst) in out.chunks_exact_mut(w).take(h).enumerate() {
        let sy = (y + r as isize).clamp(0, max_y);
        if inside_x {
            let start = reference.offset(x, sy);
            dst.copy_from_slice(&data[start..start + w]);
        } else {
            let row = reference.offset(0, sy);
            for (c, px) in dst.iter_mut().enumerate() {
                *px = data[row + (x + c as isize).clamp(0, max_x) as usize];
            }
        }
    }
}

/// Predict a `w` x `h` block at (`x`, `y`) of `dst` from `reference`
/// displaced by `mv`.
#[allow(clippy::too_many_arguments)]
pub fn predict_block(
    reference: &Plane,
    dst: &mut Plane,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    mv: MotionVector,
    filter: InterpFilter,
) {
    debug_assert!(w <= MAX_BLOCK && h <= MAX_BLOCK);
    let src_x = x as isize + (mv.col >> 3) as isize;
    let src_y = y as isize + (mv.row >> 3) as isize;
    let fx = (mv.col & 7) as usize;
    let fy = (mv.row & 7) as usize;

    let mut pred = [0u8; MAX_BLOCK * MAX_BLOCK];
    let pred = &mut pred[..w * h];
    let mut window = [0u8; MAX_WINDOW * MAX_WINDOW];

    if fx == 0 && fy == 0 {
        fetch_window(reference, src_x, src_y, w, h, pred);
    } else {
        match filter {
            InterpFilter::SixTap => {
                let (ww, wh) = (w + 5, h + 5);
                let window = &mut window[..ww * wh];
                fetch_window(reference, src_x - 2, src_y - 2, ww, wh, window);
                sixtap_2d(window, ww, w, h, fx, fy, pred);
            }
            InterpFilter::Bilinear => {
                let (ww, wh) = (w + 1, h + 1);
                let window = &mut window[..ww * wh];
                fetch_window(reference, src_x, src_y, ww, wh, window);
                bilinear_2d(window, ww, w, h, fx, fy, pred);
            }
        }
    }

    let stride = dst.stride();
    let base = dst.offset(x as isize, y as isize);
    let data = dst.data_mut();
    for (r, row) in pred.chunks_exact(w).enumerate() {
        data[base + r * stride..base + r * stride + w].copy_from_slice(row);
    }
}

#[inline]
fn round_clamp(sum: i32) -> u8 {
    ((sum + 64) >> 7).clamp(0, 255) as u8
}

/// Six-tap filter over a window whose origin is two pixels up and left of
/// the block.
fn sixtap_2d(
    window: &[u8],
    ww: usize,
    w: usize,
    h: usize,
    fx: usize,
    fy: usize,
    out: &mut [u8],
) {
    let hf = &SIXTAP_FILTERS[fx];
    let vf = &SIXTAP_FILTERS[fy];
    let mut temp = [0u8; MAX_BLOCK * MAX_WINDOW];

    // Horizontal pass over every window row
    for r in 0..h + 5 {
        let src = &window[r * ww..r * ww + ww];
        for c in 0..w {
            let sum: i32 = hf.iter().zip(&src[c..c + 6]).map(|(&f, &p)| f * p as i32).sum();
            temp[r * w + c] = round_clamp(sum);
        }
    }

    for r in 0..h {
        for c in 0..w {
            let sum: i32 = vf
                .iter()
                .enumerate()
                .map(|(t, &f)| f * temp[(r + t) * w + c] as i32)
                .sum();
            out[r * w + c] = round_clamp(sum);
        }
    }
}

fn bilinear_2d(
    window: &[u8],
    ww: usize,
    w: usize,
    h: usize,
    fx: usize,
    fy: usize,
    out: &mut [u8],
) {
    let [h0, h1] = BILINEAR_FILTERS[fx];
    let [v0, v1] = BILINEAR_FILTERS[fy];
    let mut temp = [0i32; MAX_BLOCK * (MAX_BLOCK + 1)];

    for r in 0..h + 1 {
        let src = &window[r * ww..];
        for c in 0..w {
            temp[r * w + c] = (src[c] as i32 * h0 + src[c + 1] as i32 * h1 + 64) >> 7;
        }
    }

    for r in 0..h {
        for c in 0..w {
            let sum = temp[r * w + c] * v0 + temp[(r + 1) * w + c] * v1;
            out[r * w + c] = ((sum + 64) >> 7) as u8;
        }
    }
}

/// Derive the chroma vector of a whole-macroblock luma vector.
///
/// The luma vector is halved, rounding away from zero, which gives 1/8 pel
/// in the chroma plane. Full-pixel streams drop the fraction.
pub fn chroma_mv(mv: MotionVector, full_pixel: bool) -> MotionVector {
    let derive = |v: i16| {
        let v = v as i32;
        let v = (v + if v < 0 { -1 } else { 1 }) / 2;
        if full_pixel {
            v & !7
        } else {
            v
        }
    };
    MotionVector::new(derive(mv.row) as i16, derive(mv.col) as i16)
}

/// Derive the vector of a 4x4 chroma block from the four luma vectors it
/// covers in a SPLITMV macroblock.
pub fn split_chroma_mv(luma: [MotionVector; 4], full_pixel: bool) -> MotionVector {
    let derive = |sum: i32| {
        let sum = sum + 4 + if sum < 0 { -8 } else { 0 };
        let v = sum / 8;
        if full_pixel {
            v & !7
        } else {
            v
        }
    };
    let row: i32 = luma.iter().map(|mv| mv.row as i32).sum();
    let col: i32 = luma.iter().map(|mv| mv.col as i32).sum();
    MotionVector::new(derive(row) as i16, derive(col) as i16)
}
