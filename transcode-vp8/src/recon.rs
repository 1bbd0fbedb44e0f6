//! Macroblock reconstruction: prediction plus inverse transformed residual.

use crate::error::{Result, Vp8Error};
use crate::frame::{FrameBuffer, Plane};
use crate::inter::{self, chroma_mv, split_chroma_mv, InterpFilter};
use crate::modemv::{MacroblockInfo, MvBounds};
use crate::prediction::{predict_block, predict_subblock, store_subblock, SubblockEdges};
use crate::quant::{dequantize, DequantFactors};
use crate::tokens::{MacroblockCoeffs, Y2_BLOCK};
use crate::transform::{add_residual, idct4x4, iwht4x4};
use crate::{MbMode, MotionVector, RefFrame};

/// Spatial residual of the 16 luma and 8 chroma blocks of a macroblock.
pub type Residual = [[i32; 16]; 24];

/// Dequantize and inverse transform all blocks of a macroblock.
pub fn inverse_transform(
    coeffs: &mut MacroblockCoeffs,
    factors: &DequantFactors,
    has_y2: bool,
) -> Residual {
    let mut residual = [[0i32; 16]; 24];

    let mut dc = [0i32; 16];
    if has_y2 {
        dequantize(&mut coeffs[Y2_BLOCK], &factors.y2);
        iwht4x4(&coeffs[Y2_BLOCK], &mut dc);
    }

    for (i, (block, out)) in coeffs.iter_mut().zip(residual.iter_mut()).enumerate() {
        if i < 16 {
            dequantize(block, &factors.y1);
            if has_y2 {
                block[0] = dc[i];
            }
        } else {
            dequantize(block, &factors.uv);
        }
        if block.iter().any(|&c| c != 0) {
            idct4x4(block, out);
        }
    }

    residual
}

fn add_block(plane: &mut Plane, x: usize, y: usize, residual: &[i32; 16]) {
    let offset = plane.offset(x as isize, y as isize);
    let stride = plane.stride();
    add_residual(residual, plane.data_mut(), offset, stride);
}

/// Reference buffers and frame-wide settings for reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor<'a> {
    refs: [Option<&'a FrameBuffer>; 4],
    filter: InterpFilter,
    full_pixel: bool,
    mb_rows: usize,
    mb_cols: usize,
}

impl<'a> Reconstructor<'a> {
    /// Create a reconstructor for a `mb_cols` x `mb_rows` frame. `refs` is
    /// indexed by [`RefFrame`]; the intra slot is unused.
    pub fn new(
        refs: [Option<&'a FrameBuffer>; 4],
        filter: InterpFilter,
        full_pixel: bool,
        mb_cols: usize,
        mb_rows: usize,
    ) -> Self {
        Self {
            refs,
            filter,
            full_pixel,
            mb_rows,
            mb_cols,
        }
    }

    /// Reference buffer of `rf`.
    pub fn reference(&self, rf: RefFrame) -> Option<&'a FrameBuffer> {
        self.refs[rf as usize]
    }

    /// Reconstruct macroblock (`mb_row`, `mb_col`) into `dst`.
    pub fn macroblock(
        &self,
        dst: &mut FrameBuffer,
        info: &MacroblockInfo,
        mb_row: usize,
        mb_col: usize,
        residual: Option<&Residual>,
    ) -> Result<()> {
        if info.ref_frame == RefFrame::Intra {
            self.intra(dst, info, mb_row, mb_col, residual);
        } else {
            let reference = self
                .reference(info.ref_frame)
                .ok_or_else(|| Vp8Error::corrupt("inter macroblock without reference"))?;
            self.inter(dst, reference, info, mb_row, mb_col);
            if let Some(res) = residual {
                add_luma(dst, mb_row, mb_col, res);
            }
        }
        if let Some(res) = residual {
            add_chroma(dst, mb_row, mb_col, res);
        }
        Ok(())
    }

    fn intra(
        &self,
        dst: &mut FrameBuffer,
        info: &MacroblockInfo,
        mb_row: usize,
        mb_col: usize,
        residual: Option<&Residual>,
    ) {
        let (x0, y0) = (mb_col * 16, mb_row * 16);
        let (have_above, have_left) = (mb_row > 0, mb_col > 0);

        if info.y_mode == MbMode::BPred {
            for (i, &mode) in info.bmodes.iter().enumerate() {
                let (bx, by) = (x0 + 4 * (i % 4), y0 + 4 * (i / 4));
                let above_right_row = if i % 4 == 3 {
                    y0 as isize - 1
                } else {
                    by as isize - 1
                };
                let edges = SubblockEdges::gather(&dst.y, bx, by, above_right_row);
                store_subblock(&mut dst.y, bx, by, &predict_subblock(mode, &edges));
                if let Some(res) = residual {
                    add_block(&mut dst.y, bx, by, &res[i]);
                }
            }
        } else {
            predict_block(&mut dst.y, x0, y0, 16, info.y_mode, have_above, have_left);
            if let Some(res) = residual {
                add_luma(dst, mb_row, mb_col, res);
            }
        }

        for plane in [&mut dst.u, &mut dst.v] {
            predict_block(plane, mb_col * 8, mb_row * 8, 8, info.uv_mode, have_above, have_left);
        }
    }

    fn inter(
        &self,
        dst: &mut FrameBuffer,
        reference: &FrameBuffer,
        info: &MacroblockInfo,
        mb_row: usize,
        mb_col: usize,
    ) {
        let bounds = MvBounds::new(mb_row, mb_col, self.mb_rows, self.mb_cols);
        let (x0, y0) = (mb_col * 16, mb_row * 16);
        let (cx, cy) = (mb_col * 8, mb_row * 8);

        if info.y_mode != MbMode::SplitMv {
            let mv = if info.need_clamp {
                bounds.clamp_to_border(info.mv)
            } else {
                info.mv
            };
            inter::predict_block(&reference.y, &mut dst.y, x0, y0, 16, 16, mv, self.filter);

            let cmv = chroma_mv(mv, self.full_pixel);
            inter::predict_block(&reference.u, &mut dst.u, cx, cy, 8, 8, cmv, self.filter);
            inter::predict_block(&reference.v, &mut dst.v, cx, cy, 8, 8, cmv, self.filter);
            return;
        }

        for (i, &mv) in info.mvs.iter().enumerate() {
            let mv = if info.need_clamp {
                bounds.clamp_to_border(mv)
            } else {
                mv
            };
            let (bx, by) = (x0 + 4 * (i % 4), y0 + 4 * (i / 4));
            inter::predict_block(&reference.y, &mut dst.y, bx, by, 4, 4, mv, self.filter);
        }

        for row in 0..2 {
            for col in 0..2 {
                let b = row * 8 + col * 2;
                let luma: [MotionVector; 4] =
                    [info.mvs[b], info.mvs[b + 1], info.mvs[b + 4], info.mvs[b + 5]];
                let mut cmv = split_chroma_mv(luma, self.full_pixel);
                if info.need_clamp {
                    cmv = bounds.clamp_chroma_to_border(cmv);
                }
                let (bx, by) = (cx + 4 * col, cy + 4 * row);
                inter::predict_block(&reference.u, &mut dst.u, bx, by, 4, 4, cmv, self.filter);
                inter::predict_block(&reference.v, &mut dst.v, bx, by, 4, 4, cmv, self.filter);
            }
        }
    }
}

fn add_luma(dst: &mut FrameBuffer, mb_row: usize, mb_col: usize, residual: &Residual) {
    for (i, res) in residual[..16].iter().enumerate() {
        add_block(&mut dst.y, mb_col * 16 + 4 * (i % 4), mb_row * 16 + 4 * (i / 4), res);
    }
}

fn add_chroma(dst: &mut FrameBuffer, mb_row: usize, mb_col: usize, residual: &Residual) {
    for (i, res) in residual[16..].iter().enumerate() {
        let plane = if i < 4 { &mut dst.u } else { &mut dst.v };
        let j = i % 4;
        add_block(plane, mb_col * 8 + 4 * (j % 2), mb_row * 8 + 4 * (j / 2), res);
    }
}
