//! VP8 intra prediction.
//!
//! Predictors read their edges straight from the frame being reconstructed.
//! The row above the picture holds 127 and the column to its left 129 (see
//! [`Plane::setup_intra_edges`]), so edge macroblocks need no special cases
//! apart from DC averaging.

use crate::frame::Plane;
use crate::{BMode, MbMode};

/// Edges of a 16x16 or 8x8 block.
#[derive(Debug, Clone)]
struct BlockEdges {
    above: [u8; 16],
    left: [u8; 16],
    above_left: u8,
}

impl BlockEdges {
    fn gather(plane: &Plane, x: usize, y: usize, size: usize) -> Self {
        let (x, y) = (x as isize, y as isize);
        let mut above = [0u8; 16];
        let mut left = [0u8; 16];
        let row = plane.offset(x, y - 1);
        above[..size].copy_from_slice(&plane.data()[row..row + size]);
        for (i, l) in left[..size].iter_mut().enumerate() {
            *l = plane.pixel(x - 1, y + i as isize);
        }
        Self {
            above,
            left,
            above_left: plane.pixel(x - 1, y - 1),
        }
    }
}

/// Predict a whole 16x16 luma (`size` 16) or 8x8 chroma (`size` 8) block
/// at (`x`, `y`) in place.
///
/// `have_above` and `have_left` tell whether the macroblock has neighbours
/// inside the picture; only DC prediction depends on them.
pub fn predict_block(
    plane: &mut Plane,
    x: usize,
    y: usize,
    size: usize,
    mode: MbMode,
    have_above: bool,
    have_left: bool,
) {
    let edges = BlockEdges::gather(plane, x, y, size);
    let stride = plane.stride();
    let base = plane.offset(x as isize, y as isize);
    let data = plane.data_mut();

    match mode {
        MbMode::VPred => {
            for r in 0..size {
                let start = base + r * stride;
                data[start..start + size].copy_from_slice(&edges.above[..size]);
            }
        }
        MbMode::HPred => {
            for r in 0..size {
                let start = base + r * stride;
                data[start..start + size].fill(edges.left[r]);
            }
        }
        MbMode::TmPred => {
            let tl = edges.above_left as i32;
            for r in 0..size {
                let start = base + r * stride;
                let l = edges.left[r] as i32;
                for (px, &a) in data[start..start + size].iter_mut().zip(&edges.above) {
                    *px = (l + a as i32 - tl).clamp(0, 255) as u8;
                }
            }
        }
        _ => {
            let dc = dc_value(&edges, size, have_above, have_left);
            for r in 0..size {
                let start = base + r * stride;
                data[start..start + size].fill(dc);
            }
        }
    }
}

fn dc_value(edges: &BlockEdges, size: usize, have_above: bool, have_left: bool) -> u8 {
    let mut shift = if size == 16 { 3 } else { 2 };
    let mut sum = 0u32;
    if have_above {
        sum += edges.above[..size].iter().map(|&p| p as u32).sum::<u32>();
        shift += 1;
    }
    if have_left {
        sum += edges.left[..size].iter().map(|&p| p as u32).sum::<u32>();
        shift += 1;
    }
    if !have_above && !have_left {
        return 128;
    }
    ((sum + (1 << (shift - 1))) >> shift) as u8
}

/// Edges of a 4x4 sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubblockEdges {
    /// Four pixels above followed by four above-right.
    pub above: [u8; 8],
    /// Four pixels to the left.
    pub left: [u8; 4],
    /// Pixel above-left.
    pub above_left: u8,
}

impl SubblockEdges {
    /// Gather the edges of the sub-block at (`x`, `y`).
    ///
    /// The above-right pixels are read from row `above_right_row`, which is
    /// the row above the macroblock for the rightmost sub-block column and
    /// `y - 1` otherwise.
    pub fn gather(plane: &Plane, x: usize, y: usize, above_right_row: isize) -> Self {
        let (x, y) = (x as isize, y as isize);
        let mut above = [0u8; 8];
        let row = plane.offset(x, y - 1);
        above[..4].copy_from_slice(&plane.data()[row..row + 4]);
        let right = plane.offset(x + 4, above_right_row);
        above[4..].copy_from_slice(&plane.data()[right..right + 4]);
        let mut left = [0u8; 4];
        for (i, l) in left.iter_mut().enumerate() {
            *l = plane.pixel(x - 1, y + i as isize);
        }
        Self {
            above,
            left,
            above_left: plane.pixel(x - 1, y - 1),
        }
    }
}

#[inline]
fn avg2(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16 + 1) >> 1) as u8
}

#[inline]
fn avg3(a: u8, b: u8, c: u8) -> u8 {
    ((a as u16 + 2 * b as u16 + c as u16 + 2) >> 2) as u8
}

/// Predict one 4x4 sub-block in raster order.
pub fn predict_subblock(mode: BMode, e: &SubblockEdges) -> [u8; 16] {
    let a = &e.above;
    let l = &e.left;
    let tl = e.above_left;
    let mut out = [0u8; 16];

    match mode {
        BMode::Dc => {
            let sum: u32 = a[..4].iter().chain(l).map(|&p| p as u32).sum();
            out.fill(((sum + 4) >> 3) as u8);
        }
        BMode::Tm => {
            for (r, row) in out.chunks_exact_mut(4).enumerate() {
                for (c, px) in row.iter_mut().enumerate() {
                    *px = (l[r] as i32 + a[c] as i32 - tl as i32).clamp(0, 255) as u8;
                }
            }
        }
        BMode::Ve => {
            let smoothed = [
                avg3(tl, a[0], a[1]),
                avg3(a[0], a[1], a[2]),
                avg3(a[1], a[2], a[3]),
                avg3(a[2], a[3], a[4]),
            ];
            for row in out.chunks_exact_mut(4) {
                row.copy_from_slice(&smoothed);
            }
        }
        BMode::He => {
            let smoothed = [
                avg3(tl, l[0], l[1]),
                avg3(l[0], l[1], l[2]),
                avg3(l[1], l[2], l[3]),
                avg3(l[2], l[3], l[3]),
            ];
            for (row, &v) in out.chunks_exact_mut(4).zip(&smoothed) {
                row.fill(v);
            }
        }
        BMode::Ld => {
            let at = |i: usize| a[i.min(7)];
            for (r, row) in out.chunks_exact_mut(4).enumerate() {
                for (c, px) in row.iter_mut().enumerate() {
                    let i = r + c;
                    *px = avg3(at(i), at(i + 1), at(i + 2));
                }
            }
        }
        BMode::Rd => {
            let p = [l[3], l[2], l[1], l[0], tl, a[0], a[1], a[2], a[3]];
            for (r, row) in out.chunks_exact_mut(4).enumerate() {
                for (c, px) in row.iter_mut().enumerate() {
                    let i = 3 - r + c;
                    *px = avg3(p[i], p[i + 1], p[i + 2]);
                }
            }
        }
        BMode::Vr => {
            let p = [l[3], l[2], l[1], l[0], tl, a[0], a[1], a[2], a[3]];
            out = [
                avg2(p[4], p[5]), avg2(p[5], p[6]), avg2(p[6], p[7]), avg2(p[7], p[8]),
                avg3(p[3], p[4], p[5]), avg3(p[4], p[5], p[6]), avg3(p[5], p[6], p[7]), avg3(p[6], p[7], p[8]),
                avg3(p[2], p[3], p[4]), avg2(p[4], p[5]), avg2(p[5], p[6]), avg2(p[6], p[7]),
                avg3(p[1], p[2], p[3]), avg3(p[3], p[4], p[5]), avg3(p[4], p[5], p[6]), avg3(p[5], p[6], p[7]),
            ];
        }
        BMode::Vl => {
            let p = a;
            out = [
                avg2(p[0], p[1]), avg2(p[1], p[2]), avg2(p[2], p[3]), avg2(p[3], p[4]),
                avg3(p[0], p[1], p[2]), avg3(p[1], p[2], p[3]), avg3(p[2], p[3], p[4]), avg3(p[3], p[4], p[5]),
                avg2(p[1], p[2]), avg2(p[2], p[3]), avg2(p[3], p[4]), avg3(p[4], p[5], p[6]),
                avg3(p[1], p[2], p[3]), avg3(p[2], p[3], p[4]), avg3(p[3], p[4], p[5]), avg3(p[5], p[6], p[7]),
            ];
        }
        BMode::Hd => {
            let p = [l[3], l[2], l[1], l[0], tl, a[0], a[1], a[2], a[3]];
            out = [
                avg2(p[3], p[4]), avg3(p[3], p[4], p[5]), avg3(p[4], p[5], p[6]), avg3(p[5], p[6], p[7]),
                avg2(p[2], p[3]), avg3(p[2], p[3], p[4]), avg2(p[3], p[4]), avg3(p[3], p[4], p[5]),
                avg2(p[1], p[2]), avg3(p[1], p[2], p[3]), avg2(p[2], p[3]), avg3(p[2], p[3], p[4]),
                avg2(p[0], p[1]), avg3(p[0], p[1], p[2]), avg2(p[1], p[2]), avg3(p[1], p[2], p[3]),
            ];
        }
        BMode::Hu => {
            out = [
                avg2(l[0], l[1]), avg3(l[0], l[1], l[2]), avg2(l[1], l[2]), avg3(l[1], l[2], l[3]),
                avg2(l[1], l[2]), avg3(l[1], l[2], l[3]), avg2(l[2], l[3]), avg3(l[2], l[3], l[3]),
                avg2(l[2], l[3]), avg3(l[2], l[3], l[3]), l[3], l[3],
                l[3], l[3], l[3], l[3],
            ];
        }
    }

    out
}

/// Store a 4x4 block at (`x`, `y`).
pub fn store_subblock(plane: &mut Plane, x: usize, y: usize, block: &[u8; 16]) {
    let stride = plane.stride();
    let base = plane.offset(x as isize, y as isize);
    let data = plane.data_mut();
    for (r, row) in block.chunks_exact(4).enumerate() {
        data[base + r * stride..base + r * stride + 4].copy_from_slice(row);
    }
}
