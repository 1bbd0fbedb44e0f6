//! Per-macroblock mode and motion vector decoding.
//!
//! Modes for the whole frame are read from the first partition before any
//! residual data. Neighbour context comes from a grid with one extra row
//! above and one extra column to the left, so edge macroblocks see default
//! (intra, zero vector, DC) neighbours without bounds checks.

use crate::bool_decoder::BoolDecoder;
use crate::context::FrameContext;
use crate::header::{FrameHeader, Segmentation};
use crate::tables::{
    BMODE_PROBS, KF_BMODE_PROBS, KF_UV_MODE_PROBS, KF_YMODE_PROBS, MB_SPLITS, MB_SPLIT_COUNT,
    MB_SPLIT_PROBS, MODE_CONTEXTS, MVP_BITS, MVP_IS_SHORT, MVP_SHORT, MVP_SIGN, MV_LONG_BITS,
    MV_PROB_COUNT, SUB_MV_REF_PROBS,
};
use crate::tree::{
    read_tree, BMODE_TREE, KF_YMODE_TREE, MB_SPLIT_TREE, MV_REF_TREE, SEGMENT_TREE,
    SMALL_MV_TREE, SUB_MV_REF_TREE, UV_MODE_TREE, YMODE_TREE,
};
use crate::{BMode, MbMode, MotionVector, RefFrame};

/// Margin beyond the frame edge, in 1/8 pel, for predicted vectors.
pub const MV_MARGIN: i32 = 16 << 3;

/// Decoded state of one 16x16 macroblock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroblockInfo {
    /// Luma prediction mode.
    pub y_mode: MbMode,
    /// Chroma prediction mode (intra only).
    pub uv_mode: MbMode,
    /// Reference frame.
    pub ref_frame: RefFrame,
    /// Whole-macroblock vector; for SPLITMV the vector of the last sub-block.
    pub mv: MotionVector,
    /// Segment id.
    pub segment_id: u8,
    /// No residual is coded, or none was found after decoding tokens.
    pub skip_coeff: bool,
    /// Some vector reaches past the border and must be clamped before use.
    pub need_clamp: bool,
    /// SPLITMV shape: 0 = 16x8, 1 = 8x16, 2 = 8x8, 3 = 4x4.
    pub partitioning: u8,
    /// Sub-block intra modes.
    pub bmodes: [BMode; 16],
    /// Sub-block vectors; all equal to `mv` unless SPLITMV.
    pub mvs: [MotionVector; 16],
}

/// Distances from a macroblock to the frame edges, in 1/8 pel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvBounds {
    /// Distance to the left edge (non-positive).
    pub to_left: i32,
    /// Distance to the right edge.
    pub to_right: i32,
    /// Distance to the top edge (non-positive).
    pub to_top: i32,
    /// Distance to the bottom edge.
    pub to_bottom: i32,
}

impl MvBounds {
    /// Bounds of macroblock (`mb_row`, `mb_col`) in a `mb_rows` x `mb_cols` frame.
    pub fn new(mb_row: usize, mb_col: usize, mb_rows: usize, mb_cols: usize) -> Self {
        Self {
            to_left: -((mb_col as i32 * 16) << 3),
            to_right: ((mb_cols as i32 - 1 - mb_col as i32) * 16) << 3,
            to_top: -((mb_row as i32 * 16) << 3),
            to_bottom: ((mb_rows as i32 - 1 - mb_row as i32) * 16) << 3,
        }
    }

    /// Clamp a predicted vector to the edges plus [`MV_MARGIN`].
    pub fn clamp(&self, mv: MotionVector) -> MotionVector {
        let col = (mv.col as i32).clamp(self.to_left - MV_MARGIN, self.to_right + MV_MARGIN);
        let row = (mv.row as i32).clamp(self.to_top - MV_MARGIN, self.to_bottom + MV_MARGIN);
        MotionVector::new(row as i16, col as i16)
    }

    /// Vector lies outside the edges plus [`MV_MARGIN`].
    pub fn is_outside(&self, mv: MotionVector) -> bool {
        (mv.col as i32) < self.to_left - MV_MARGIN
            || (mv.col as i32) > self.to_right + MV_MARGIN
            || (mv.row as i32) < self.to_top - MV_MARGIN
            || (mv.row as i32) > self.to_bottom + MV_MARGIN
    }

    /// Limit a luma vector that points entirely into the border.
    ///
    /// Beyond 19 pixels left/up or 18 pixels right/down no visible pixel
    /// contributes, so the vector is snapped to a whole 16 pixel offset.
    pub fn clamp_to_border(&self, mv: MotionVector) -> MotionVector {
        let (row, col) = (mv.row as i32, mv.col as i32);
        let col = if col < self.to_left - (19 << 3) {
            self.to_left - (16 << 3)
        } else if col > self.to_right + (18 << 3) {
            self.to_right + (16 << 3)
        } else {
            col
        };
        let row = if row < self.to_top - (19 << 3) {
            self.to_top - (16 << 3)
        } else if row > self.to_bottom + (18 << 3) {
            self.to_bottom + (16 << 3)
        } else {
            row
        };
        MotionVector::new(row as i16, col as i16)
    }

    /// Chroma counterpart of [`MvBounds::clamp_to_border`].
    pub fn clamp_chroma_to_border(&self, mv: MotionVector) -> MotionVector {
        let (mut row, mut col) = (mv.row as i32, mv.col as i32);
        if 2 * col < self.to_left - (19 << 3) {
            col = (self.to_left - (16 << 3)) >> 1;
        }
        if 2 * col > self.to_right + (18 << 3) {
            col = (self.to_right + (16 << 3)) >> 1;
        }
        if 2 * row < self.to_top - (19 << 3) {
            row = (self.to_top - (16 << 3)) >> 1;
        }
        if 2 * row > self.to_bottom + (18 << 3) {
            row = (self.to_bottom + (16 << 3)) >> 1;
        }
        MotionVector::new(row as i16, col as i16)
    }
}

/// Frame-level inputs to mode decoding.
#[derive(Debug, Clone, Copy)]
pub struct ModeParams<'a> {
    /// Frame is a keyframe.
    pub key_frame: bool,
    /// Compressed header.
    pub header: &'a FrameHeader,
    /// Segmentation state.
    pub segmentation: &'a Segmentation,
    /// Entropy state.
    pub context: &'a FrameContext,
}

impl ModeParams<'_> {
    fn sign_bias(&self, rf: RefFrame) -> bool {
        match rf {
            RefFrame::Golden => self.header.sign_bias_golden,
            RefFrame::AltRef => self.header.sign_bias_altref,
            _ => false,
        }
    }
}

/// Macroblock grid with a border row and column.
#[derive(Debug, Clone)]
pub struct MacroblockGrid {
    mb_cols: usize,
    mb_rows: usize,
    infos: Vec<MacroblockInfo>,
}

impl MacroblockGrid {
    /// Allocate a grid for `mb_cols` x `mb_rows` macroblocks.
    pub fn new(mb_cols: usize, mb_rows: usize) -> Self {
        Self {
            mb_cols,
            mb_rows,
            infos: vec![MacroblockInfo::default(); (mb_cols + 1) * (mb_rows + 1)],
        }
    }

    /// Macroblock columns.
    pub fn mb_cols(&self) -> usize {
        self.mb_cols
    }

    /// Macroblock rows.
    pub fn mb_rows(&self) -> usize {
        self.mb_rows
    }

    #[inline]
    fn index(&self, mb_row: usize, mb_col: usize) -> usize {
        (mb_row + 1) * (self.mb_cols + 1) + mb_col + 1
    }

    /// Info of macroblock (`mb_row`, `mb_col`).
    pub fn get(&self, mb_row: usize, mb_col: usize) -> &MacroblockInfo {
        &self.infos[self.index(mb_row, mb_col)]
    }

    /// Mutable info of macroblock (`mb_row`, `mb_col`).
    pub fn get_mut(&mut self, mb_row: usize, mb_col: usize) -> &mut MacroblockInfo {
        let idx = self.index(mb_row, mb_col);
        &mut self.infos[idx]
    }

    fn above(&self, idx: usize) -> &MacroblockInfo {
        &self.infos[idx - (self.mb_cols + 1)]
    }

    fn left(&self, idx: usize) -> &MacroblockInfo {
        &self.infos[idx - 1]
    }

    fn above_left(&self, idx: usize) -> &MacroblockInfo {
        &self.infos[idx - (self.mb_cols + 1) - 1]
    }

    /// Read the modes of every macroblock in raster order.
    pub fn decode_modes(&mut self, bd: &mut BoolDecoder<'_>, params: &ModeParams<'_>) {
        for mb_row in 0..self.mb_rows {
            for mb_col in 0..self.mb_cols {
                self.decode_macroblock(bd, params, mb_row, mb_col);
            }
        }
    }

    fn decode_macroblock(
        &mut self,
        bd: &mut BoolDecoder<'_>,
        params: &ModeParams<'_>,
        mb_row: usize,
        mb_col: usize,
    ) {
        let idx = self.index(mb_row, mb_col);
        let hdr = params.header;
        let seg = params.segmentation;

        let segment_id = if seg.update_map {
            read_tree(bd, &SEGMENT_TREE, &seg.tree_probs)
        } else if params.key_frame {
            0
        } else {
            self.infos[idx].segment_id
        };
        let skip_coeff = hdr.mb_no_coeff_skip && bd.read_bool(hdr.prob_skip_false);

        let mut info = MacroblockInfo {
            segment_id,
            skip_coeff,
            ..MacroblockInfo::default()
        };

        if params.key_frame {
            self.read_kf_modes(bd, idx, &mut info);
        } else if bd.read_bool(hdr.prob_intra) {
            self.read_inter_modes(bd, params, idx, mb_row, mb_col, &mut info);
        } else {
            read_intra_modes(bd, params.context, &mut info);
        }

        self.infos[idx] = info;
    }

    fn read_kf_modes(&self, bd: &mut BoolDecoder<'_>, idx: usize, info: &mut MacroblockInfo) {
        info.y_mode = MbMode::from_intra(read_tree(bd, &KF_YMODE_TREE, &KF_YMODE_PROBS));
        if info.y_mode == MbMode::BPred {
            let above = self.above(idx).bmodes;
            let left = self.left(idx).bmodes;
            for i in 0..16 {
                let a = if i < 4 { above[i + 12] } else { info.bmodes[i - 4] };
                let l = if i & 3 == 0 { left[i + 3] } else { info.bmodes[i - 1] };
                let probs = &KF_BMODE_PROBS[a as usize][l as usize];
                info.bmodes[i] = BMode::from_leaf(read_tree(bd, &BMODE_TREE, probs));
            }
        } else {
            info.bmodes = [info.y_mode.implied_bmode(); 16];
        }
        info.uv_mode = MbMode::from_intra(read_tree(bd, &UV_MODE_TREE, &KF_UV_MODE_PROBS));
    }

    fn read_inter_modes(
        &self,
        bd: &mut BoolDecoder<'_>,
        params: &ModeParams<'_>,
        idx: usize,
        mb_row: usize,
        mb_col: usize,
        info: &mut MacroblockInfo,
    ) {
        let hdr = params.header;
        info.ref_frame = if bd.read_bool(hdr.prob_last) {
            if bd.read_bool(hdr.prob_golden) {
                RefFrame::AltRef
            } else {
                RefFrame::Golden
            }
        } else {
            RefFrame::Last
        };

        let bounds = MvBounds::new(mb_row, mb_col, self.mb_rows, self.mb_cols);
        let near = self.find_near_mvs(idx, info.ref_frame, params);
        let probs = near.mode_probs();
        let best = bounds.clamp(near.best);
        let mv_probs = &params.context.mv_probs;

        info.y_mode = MbMode::from_inter(read_tree(bd, &MV_REF_TREE, &probs));
        info.mv = match info.y_mode {
            MbMode::NearestMv => bounds.clamp(near.nearest),
            MbMode::NearMv => bounds.clamp(near.near),
            MbMode::NewMv => {
                let delta = read_mv(bd, mv_probs);
                let mv = MotionVector::new(
                    delta.row.wrapping_add(best.row),
                    delta.col.wrapping_add(best.col),
                );
                info.need_clamp = bounds.is_outside(mv);
                mv
            }
            MbMode::SplitMv => {
                self.read_split_mv(bd, idx, best, &bounds, mv_probs, info);
                info.mvs[15]
            }
            _ => MotionVector::ZERO,
        };
        if info.y_mode != MbMode::SplitMv {
            info.mvs = [info.mv; 16];
        }
    }

    fn read_split_mv(
        &self,
        bd: &mut BoolDecoder<'_>,
        idx: usize,
        best: MotionVector,
        bounds: &MvBounds,
        mv_probs: &[[u8; MV_PROB_COUNT]; 2],
        info: &mut MacroblockInfo,
    ) {
        let shape = read_tree(bd, &MB_SPLIT_TREE, &MB_SPLIT_PROBS) as usize;
        info.partitioning = shape as u8;
        let map = &MB_SPLITS[shape];
        let above = &self.above(idx).mvs;
        let left = &self.left(idx).mvs;

        for part in 0..MB_SPLIT_COUNT[shape] {
            let k = map.iter().position(|&p| p as usize == part).unwrap_or(0);
            let left_mv = if k & 3 == 0 { left[k + 3] } else { info.mvs[k - 1] };
            let above_mv = if k < 4 { above[k + 12] } else { info.mvs[k - 4] };

            let ctx = sub_mv_context(left_mv, above_mv);
            let mv = match read_tree(bd, &SUB_MV_REF_TREE, &SUB_MV_REF_PROBS[ctx]) {
                0 => left_mv,
                1 => above_mv,
                2 => MotionVector::ZERO,
                _ => {
                    let delta = read_mv(bd, mv_probs);
                    MotionVector::new(
                        delta.row.wrapping_add(best.row),
                        delta.col.wrapping_add(best.col),
                    )
                }
            };
            info.need_clamp |= bounds.is_outside(mv);

            for (b, &p) in map.iter().enumerate() {
                if p as usize == part {
                    info.mvs[b] = mv;
                }
            }
        }
    }

    /// Gather candidate vectors from the above, left and above-left neighbours.
    fn find_near_mvs(&self, idx: usize, ref_frame: RefFrame, params: &ModeParams<'_>) -> NearMvs {
        let neighbours = [
            (self.above(idx), 2u8),
            (self.left(idx), 2u8),
            (self.above_left(idx), 1u8),
        ];
        let cur_bias = params.sign_bias(ref_frame);

        let mut mvs = [MotionVector::ZERO; 4];
        let mut counts = [0u8; 4];
        let mut n = 0usize;

        for &(nb, weight) in neighbours.iter() {
            if nb.ref_frame == RefFrame::Intra {
                continue;
            }
            if nb.mv.is_zero() {
                counts[0] += weight;
                continue;
            }
            let mut mv = nb.mv;
            if params.sign_bias(nb.ref_frame) != cur_bias {
                mv = mv.negate();
            }
            if mv != mvs[n] {
                n += 1;
                mvs[n] = mv;
            }
            counts[n] += weight;
        }

        if counts[3] != 0 && mvs[n] == mvs[1] {
            counts[1] += 1;
        }

        counts[3] = neighbours
            .iter()
            .filter(|(nb, _)| nb.y_mode == MbMode::SplitMv)
            .map(|&(_, weight)| weight)
            .sum();

        if counts[2] > counts[1] {
            counts.swap(1, 2);
            mvs.swap(1, 2);
        }
        if counts[1] >= counts[0] {
            mvs[0] = mvs[1];
        }

        NearMvs {
            best: mvs[0],
            nearest: mvs[1],
            near: mvs[2],
            counts,
        }
    }
}

/// Candidate vectors and their weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NearMvs {
    best: MotionVector,
    nearest: MotionVector,
    near: MotionVector,
    counts: [u8; 4],
}

impl NearMvs {
    fn mode_probs(&self) -> [u8; 4] {
        let mut probs = [0u8; 4];
        for (i, p) in probs.iter_mut().enumerate() {
            *p = MODE_CONTEXTS[self.counts[i] as usize][i];
        }
        probs
    }
}

fn read_intra_modes(bd: &mut BoolDecoder<'_>, ctx: &FrameContext, info: &mut MacroblockInfo) {
    info.y_mode = MbMode::from_intra(read_tree(bd, &YMODE_TREE, &ctx.ymode_probs));
    if info.y_mode == MbMode::BPred {
        for b in info.bmodes.iter_mut() {
            *b = BMode::from_leaf(read_tree(bd, &BMODE_TREE, &BMODE_PROBS));
        }
    } else {
        info.bmodes = [info.y_mode.implied_bmode(); 16];
    }
    info.uv_mode = MbMode::from_intra(read_tree(bd, &UV_MODE_TREE, &ctx.uv_mode_probs));
}

fn sub_mv_context(left: MotionVector, above: MotionVector) -> usize {
    let lez = left.is_zero();
    let aez = above.is_zero();
    let lea = left == above;
    if lea && lez {
        4
    } else if lea {
        3
    } else if aez {
        2
    } else if lez {
        1
    } else {
        0
    }
}

/// Read one vector component, in quarter pel.
pub fn read_mv_component(bd: &mut BoolDecoder<'_>, probs: &[u8; MV_PROB_COUNT]) -> i16 {
    let mut x: i16 = if bd.read_bool(probs[MVP_IS_SHORT]) {
        let mut x = 0i16;
        for i in 0..3 {
            x += (bd.read_bool(probs[MVP_BITS + i]) as i16) << i;
        }
        for i in (4..MV_LONG_BITS).rev() {
            x += (bd.read_bool(probs[MVP_BITS + i]) as i16) << i;
        }
        if x & !0xf == 0 || bd.read_bool(probs[MVP_BITS + 3]) {
            x += 8;
        }
        x
    } else {
        read_tree(bd, &SMALL_MV_TREE, &probs[MVP_SHORT..MVP_BITS]) as i16
    };
    if x != 0 && bd.read_bool(probs[MVP_SIGN]) {
        x = -x;
    }
    x
}

/// Read a row/column vector, returned in 1/8 pel.
pub fn read_mv(bd: &mut BoolDecoder<'_>, probs: &[[u8; MV_PROB_COUNT]; 2]) -> MotionVector {
    let row = read_mv_component(bd, &probs[0]) * 2;
    let col = read_mv_component(bd, &probs[1]) * 2;
    MotionVector::new(row, col)
}
