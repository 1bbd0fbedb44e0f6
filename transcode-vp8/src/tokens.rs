//! DCT token decoding.
//!
//! Each macroblock carries up to 25 blocks of quantized coefficients: 16
//! luma, 4+4 chroma and, unless the macroblock predicts per sub-block, a
//! second-order (Y2) block holding the luma DC values. Token probabilities
//! depend on block type, scan band and whether the neighbouring blocks above
//! and to the left had any coefficients.

use crate::bool_decoder::BoolDecoder;
use crate::tables::{CoeffProbs, COEFF_BANDS, DCT_CAT_BASE, DCT_CAT_PROBS, NUM_TOKEN_NODES, ZIGZAG};
use crate::tree::{read_tree_from, TOKEN_TREE};

/// Token values produced by [`TOKEN_TREE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Literal magnitude 0-4.
    Literal(u8),
    /// Extra-bits category 1-6.
    Category(u8),
    /// End of block.
    EndOfBlock,
}

impl Token {
    /// Map a tree leaf.
    pub fn from_leaf(leaf: u8) -> Self {
        match leaf {
            0..=4 => Token::Literal(leaf),
            5..=10 => Token::Category(leaf - 4),
            _ => Token::EndOfBlock,
        }
    }
}

/// Block type indices into [`CoeffProbs`].
pub mod block_type {
    /// Luma blocks whose DC is carried by Y2.
    pub const Y_NO_DC: usize = 0;
    /// The Y2 block.
    pub const Y2: usize = 1;
    /// Chroma blocks.
    pub const CHROMA: usize = 2;
    /// Luma blocks with their own DC.
    pub const Y_WITH_DC: usize = 3;
}

/// Index of the Y2 block in [`MacroblockCoeffs`].
pub const Y2_BLOCK: usize = 24;

/// Quantized coefficients of one macroblock in raster order.
pub type MacroblockCoeffs = [[i32; 16]; 25];

/// Per-edge "had coefficients" flags: 4 luma, 2 Cb, 2 Cr, Y2.
pub type EdgeContext = [bool; 9];

/// Neighbour flags for the current frame.
#[derive(Debug, Clone)]
pub struct TokenContext {
    above: Vec<EdgeContext>,
    left: EdgeContext,
}

impl TokenContext {
    /// Context for a frame `mb_cols` macroblocks wide.
    pub fn new(mb_cols: usize) -> Self {
        Self {
            above: vec![EdgeContext::default(); mb_cols],
            left: EdgeContext::default(),
        }
    }

    /// Clear the left flags at the start of a macroblock row.
    pub fn start_row(&mut self) {
        self.left = EdgeContext::default();
    }

    /// Clear flags for a macroblock without coded coefficients.
    ///
    /// The Y2 flags belong to the last macroblock that had a Y2 block and
    /// are left alone otherwise.
    pub fn skip_macroblock(&mut self, mb_col: usize, has_y2: bool) {
        let above = &mut self.above[mb_col];
        above[..8].fill(false);
        self.left[..8].fill(false);
        if has_y2 {
            above[8] = false;
            self.left[8] = false;
        }
    }

    /// Decode all blocks of one macroblock into `coeffs`.
    ///
    /// Returns true if any block had at least one token before its end of
    /// block.
    pub fn decode_macroblock(
        &mut self,
        bd: &mut BoolDecoder<'_>,
        probs: &CoeffProbs,
        mb_col: usize,
        has_y2: bool,
        coeffs: &mut MacroblockCoeffs,
    ) -> bool {
        let above = &mut self.above[mb_col];
        let left = &mut self.left;
        let mut nonzero = false;

        let (y_type, first) = if has_y2 {
            let ctx = above[8] as usize + left[8] as usize;
            let nz = decode_block(bd, &probs[block_type::Y2], ctx, 0, &mut coeffs[Y2_BLOCK]);
            above[8] = nz;
            left[8] = nz;
            nonzero |= nz;
            (block_type::Y_NO_DC, 1)
        } else {
            (block_type::Y_WITH_DC, 0)
        };

        for y in 0..4 {
            for x in 0..4 {
                let ctx = above[x] as usize + left[y] as usize;
                let nz = decode_block(bd, &probs[y_type], ctx, first, &mut coeffs[y * 4 + x]);
                above[x] = nz;
                left[y] = nz;
                nonzero |= nz;
            }
        }

        for plane in 0..2 {
            let edge = 4 + plane * 2;
            for y in 0..2 {
                for x in 0..2 {
                    let ctx = above[edge + x] as usize + left[edge + y] as usize;
                    let block = 16 + plane * 4 + y * 2 + x;
                    let nz = decode_block(bd, &probs[block_type::CHROMA], ctx, 0, &mut coeffs[block]);
                    above[edge + x] = nz;
                    left[edge + y] = nz;
                    nonzero |= nz;
                }
            }
        }

        nonzero
    }
}

/// Decode one block starting at scan position `first`.
///
/// Returns false if the block ended immediately.
pub fn decode_block(
    bd: &mut BoolDecoder<'_>,
    probs: &[[[u8; NUM_TOKEN_NODES]; 3]; 8],
    ctx: usize,
    first: usize,
    out: &mut [i32; 16],
) -> bool {
    let mut i = first;
    let mut p = &probs[COEFF_BANDS[i]][ctx];
    if !bd.read_bool(p[0]) {
        return false;
    }

    loop {
        // A zero token is never followed by end of block
        if !bd.read_bool(p[1]) {
            i += 1;
            if i == 16 {
                return true;
            }
            p = &probs[COEFF_BANDS[i]][0];
            continue;
        }

        let (magnitude, next_ctx) = match Token::from_leaf(read_tree_from(bd, &TOKEN_TREE, p, 4)) {
            Token::Literal(v) => (v as i32, if v == 1 { 1 } else { 2 }),
            Token::Category(cat) => (read_extra_bits(bd, cat as usize - 1), 2),
            Token::EndOfBlock => (0, 0),
        };
        out[ZIGZAG[i]] = if bd.read_flag() { -magnitude } else { magnitude };

        i += 1;
        if i == 16 {
            return true;
        }
        p = &probs[COEFF_BANDS[i]][next_ctx];
        if !bd.read_bool(p[0]) {
            return true;
        }
    }
}

fn read_extra_bits(bd: &mut BoolDecoder<'_>, cat: usize) -> i32 {
    let mut extra = 0;
    for &prob in DCT_CAT_PROBS[cat] {
        extra = (extra << 1) | bd.read_bool(prob) as i32;
    }
    DCT_CAT_BASE[cat] + extra
}
