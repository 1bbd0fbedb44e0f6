//! Persistent entropy state.

use crate::bool_decoder::BoolDecoder;
use crate::tables::{
    CoeffProbs, COEFF_UPDATE_PROBS, DEFAULT_COEFF_PROBS, DEFAULT_MV_PROBS, DEFAULT_UV_MODE_PROBS,
    DEFAULT_YMODE_PROBS, MV_PROB_COUNT, MV_UPDATE_PROBS,
};

/// Probability tables carried from frame to frame.
///
/// Keyframes reset the context to defaults. A frame with
/// `refresh_entropy_probs` cleared applies its updates for that frame only;
/// the decoder keeps a clone and restores it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameContext {
    /// Token probabilities.
    pub coeff_probs: CoeffProbs,
    /// Inter-frame luma mode probabilities.
    pub ymode_probs: [u8; 4],
    /// Inter-frame chroma mode probabilities.
    pub uv_mode_probs: [u8; 3],
    /// Motion vector probabilities, row then column.
    pub mv_probs: [[u8; MV_PROB_COUNT]; 2],
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            coeff_probs: DEFAULT_COEFF_PROBS,
            ymode_probs: DEFAULT_YMODE_PROBS,
            uv_mode_probs: DEFAULT_UV_MODE_PROBS,
            mv_probs: DEFAULT_MV_PROBS,
        }
    }
}

impl FrameContext {
    /// Restore every table to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply the token probability updates of a frame header.
    pub fn read_coeff_updates(&mut self, bd: &mut BoolDecoder<'_>) {
        for (i, plane) in self.coeff_probs.iter_mut().enumerate() {
            for (j, band) in plane.iter_mut().enumerate() {
                for (k, ctx) in band.iter_mut().enumerate() {
                    for (l, prob) in ctx.iter_mut().enumerate() {
                        if bd.read_bool(COEFF_UPDATE_PROBS[i][j][k][l]) {
                            *prob = bd.read_literal(8) as u8;
                        }
                    }
                }
            }
        }
    }

    /// Apply optional luma and chroma mode probability replacements.
    pub fn read_mode_updates(&mut self, bd: &mut BoolDecoder<'_>) {
        if bd.read_flag() {
            for p in self.ymode_probs.iter_mut() {
                *p = bd.read_literal(8) as u8;
            }
        }
        if bd.read_flag() {
            for p in self.uv_mode_probs.iter_mut() {
                *p = bd.read_literal(8) as u8;
            }
        }
    }

    /// Apply motion vector probability updates.
    ///
    /// Updated values are 7-bit with an implied low zero bit; a coded 0
    /// becomes probability 1.
    pub fn read_mv_updates(&mut self, bd: &mut BoolDecoder<'_>) {
        for (probs, update) in self.mv_probs.iter_mut().zip(MV_UPDATE_PROBS.iter()) {
            for (p, &up) in probs.iter_mut().zip(update.iter()) {
                if bd.read_bool(up) {
                    let x = bd.read_literal(7) as u8;
                    *p = if x > 0 { x << 1 } else { 1 };
                }
            }
        }
    }
}
