//! Dequantization.

use crate::header::{QuantIndices, Segmentation, MAX_SEGMENTS};
use crate::tables::{AC_QUANT, DC_QUANT};

/// Largest quantizer index.
pub const MAX_QINDEX: i32 = 127;

/// Per-position dequantization factors for each block type.
///
/// Position 0 holds the DC factor and positions 1-15 the AC factor, so a
/// block can be scaled with a single element-wise multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequantFactors {
    /// Luma blocks.
    pub y1: [i32; 16],
    /// Second-order luma block.
    pub y2: [i32; 16],
    /// Chroma blocks.
    pub uv: [i32; 16],
}

fn dc_q(index: i32) -> i32 {
    DC_QUANT[index.clamp(0, MAX_QINDEX) as usize]
}

fn ac_q(index: i32) -> i32 {
    AC_QUANT[index.clamp(0, MAX_QINDEX) as usize]
}

fn factors(dc: i32, ac: i32) -> [i32; 16] {
    let mut f = [ac; 16];
    f[0] = dc;
    f
}

impl DequantFactors {
    /// Factors for base quantizer index `q` with the frame deltas applied.
    pub fn new(q: i32, quant: &QuantIndices) -> Self {
        let q = q.clamp(0, MAX_QINDEX);

        let y2_dc = dc_q(q + quant.y2_dc_delta) * 2;
        let y2_ac = (ac_q(q + quant.y2_ac_delta) * 155 / 100).max(8);
        let uv_dc = dc_q(q + quant.uv_dc_delta).min(132);

        Self {
            y1: factors(dc_q(q + quant.y_dc_delta), ac_q(q)),
            y2: factors(y2_dc, y2_ac),
            uv: factors(uv_dc, ac_q(q + quant.uv_ac_delta)),
        }
    }

    /// Factors for every segment; all equal when segmentation is off.
    pub fn for_segments(quant: &QuantIndices, seg: &Segmentation) -> [Self; MAX_SEGMENTS] {
        std::array::from_fn(|id| Self::new(segment_qindex(quant, seg, id), quant))
    }
}

/// Quantizer index of segment `id`.
pub fn segment_qindex(quant: &QuantIndices, seg: &Segmentation, id: usize) -> i32 {
    let q = if !seg.enabled {
        quant.y_ac_qi
    } else if seg.abs_delta {
        seg.quant[id] as i32
    } else {
        quant.y_ac_qi + seg.quant[id] as i32
    };
    q.clamp(0, MAX_QINDEX)
}

/// Scale quantized coefficients in place.
#[inline]
pub fn dequantize(coeffs: &mut [i32; 16], factors: &[i32; 16]) {
    for (c, &f) in coeffs.iter_mut().zip(factors) {
        *c *= f;
    }
}
