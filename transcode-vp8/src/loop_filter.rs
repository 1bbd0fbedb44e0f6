//! VP8 loop filter (deblocking filter).
//!
//! Runs over the whole frame after reconstruction, macroblock by macroblock
//! in raster order: left macroblock edge, inner vertical edges, top
//! macroblock edge, inner horizontal edges. Arithmetic is done on values
//! biased to the signed 8-bit range with saturation at every step.

use crate::frame::{FrameBuffer, Plane};
use crate::header::{FilterType, LoopFilterDeltas, Segmentation, MAX_SEGMENTS};
use crate::modemv::{MacroblockGrid, MacroblockInfo};
use crate::MbMode;

/// Largest filter level.
pub const MAX_FILTER_LEVEL: i32 = 63;

/// Frame-wide loop filter parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopFilterParams {
    /// Frame filter level (0-63); zero disables the filter.
    pub level: u8,
    /// Sharpness level (0-7).
    pub sharpness: u8,
    /// Filter variant.
    pub filter_type: FilterType,
    /// Frame is a keyframe; selects the edge variance thresholds.
    pub key_frame: bool,
}

impl LoopFilterParams {
    /// Create new loop filter params.
    pub fn new(level: u8, sharpness: u8, filter_type: FilterType, key_frame: bool) -> Self {
        Self {
            level: level.min(MAX_FILTER_LEVEL as u8),
            sharpness: sharpness.min(7),
            filter_type,
            key_frame,
        }
    }
}

/// Thresholds for one filter level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLimits {
    /// Limit on differences between pixels on the same side of an edge.
    pub interior: i32,
    /// Limit across inner (sub-block) edges.
    pub edge: i32,
    /// Limit across macroblock edges.
    pub mb_edge: i32,
    /// High edge variance threshold.
    pub hev_threshold: i32,
}

impl EdgeLimits {
    /// Limits for `level` at `sharpness`.
    pub fn new(level: u8, sharpness: u8, key_frame: bool) -> Self {
        let level = level as i32;
        let mut interior = level >> (sharpness > 0) as i32 >> (sharpness > 4) as i32;
        if sharpness > 0 {
            interior = interior.min(9 - sharpness as i32);
        }
        let interior = interior.max(1);

        Self {
            interior,
            edge: 2 * level + interior,
            mb_edge: 2 * (level + 2) + interior,
            hev_threshold: hev_threshold(level, key_frame),
        }
    }
}

fn hev_threshold(level: i32, key_frame: bool) -> i32 {
    if level >= 40 {
        if key_frame {
            2
        } else {
            3
        }
    } else if level >= 20 && !key_frame {
        2
    } else if level >= 15 {
        1
    } else {
        0
    }
}

/// Filter level per segment, reference frame and mode class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLevels {
    levels: [[[u8; 4]; 4]; MAX_SEGMENTS],
}

impl FilterLevels {
    /// Derive levels from the frame level and the segment and delta
    /// adjustments.
    pub fn new(base: u8, seg: &Segmentation, deltas: &LoopFilterDeltas) -> Self {
        let clamp = |v: i32| v.clamp(0, MAX_FILTER_LEVEL) as u8;
        let mut levels = [[[0u8; 4]; 4]; MAX_SEGMENTS];

        for (id, seg_levels) in levels.iter_mut().enumerate() {
            let mut level = base as i32;
            if seg.enabled {
                level = if seg.abs_delta {
                    seg.filter_level[id] as i32
                } else {
                    level + seg.filter_level[id] as i32
                };
                level = level.clamp(0, MAX_FILTER_LEVEL);
            }

            if !deltas.enabled {
                *seg_levels = [[clamp(level); 4]; 4];
                continue;
            }

            for (rf, ref_levels) in seg_levels.iter_mut().enumerate() {
                let ref_level = level + deltas.ref_deltas[rf] as i32;
                for (mode, l) in ref_levels.iter_mut().enumerate() {
                    // Intra 16x16 modes take only the reference delta
                    *l = if rf == 0 && mode != 0 {
                        clamp(ref_level)
                    } else {
                        clamp(ref_level + deltas.mode_deltas[mode] as i32)
                    };
                }
            }
        }

        Self { levels }
    }

    /// Level of one macroblock.
    pub fn level(&self, info: &MacroblockInfo) -> u8 {
        let mode = match info.y_mode {
            MbMode::BPred => 0,
            MbMode::NearestMv | MbMode::NearMv | MbMode::NewMv => 2,
            MbMode::SplitMv => 3,
            _ => 1,
        };
        self.levels[info.segment_id as usize % MAX_SEGMENTS][info.ref_frame as usize][mode]
    }
}

#[inline]
fn sclamp(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline]
fn to_signed(v: u8) -> i32 {
    (v ^ 0x80) as i8 as i32
}

#[inline]
fn to_pixel(v: i32) -> u8 {
    (sclamp(v) as i8 as u8) ^ 0x80
}

/// Eight pixels straddling an edge: p3 p2 p1 p0 | q0 q1 q2 q3.
type Taps = [u8; 8];

#[inline]
fn diff(px: &Taps, a: usize, b: usize) -> i32 {
    (px[a] as i32 - px[b] as i32).abs()
}

#[inline]
fn edge_mask(px: &Taps, limit: i32) -> bool {
    diff(px, 3, 4) * 2 + diff(px, 2, 5) / 2 <= limit
}

#[inline]
fn normal_mask(px: &Taps, interior: i32, limit: i32) -> bool {
    diff(px, 0, 1) <= interior
        && diff(px, 1, 2) <= interior
        && diff(px, 2, 3) <= interior
        && diff(px, 5, 4) <= interior
        && diff(px, 6, 5) <= interior
        && diff(px, 7, 6) <= interior
        && edge_mask(px, limit)
}

#[inline]
fn high_edge_variance(px: &Taps, threshold: i32) -> bool {
    diff(px, 2, 3) > threshold || diff(px, 5, 4) > threshold
}

/// Adjust p0 and q0 only.
fn simple_filter(px: &mut Taps) {
    let (p1, p0, q0, q1) = (to_signed(px[2]), to_signed(px[3]), to_signed(px[4]), to_signed(px[5]));
    let f = sclamp(sclamp(p1 - q1) + 3 * (q0 - p0));
    px[4] = to_pixel(q0 - (sclamp(f + 4) >> 3));
    px[3] = to_pixel(p0 + (sclamp(f + 3) >> 3));
}

/// Inner edge filter: adjusts p1..q1, or only p0 and q0 on high variance.
fn subblock_filter(px: &mut Taps, hev: bool) {
    let (p1, p0, q0, q1) = (to_signed(px[2]), to_signed(px[3]), to_signed(px[4]), to_signed(px[5]));
    let outer = if hev { sclamp(p1 - q1) } else { 0 };
    let f = sclamp(outer + 3 * (q0 - p0));
    let f1 = sclamp(f + 4) >> 3;
    let f2 = sclamp(f + 3) >> 3;
    px[4] = to_pixel(q0 - f1);
    px[3] = to_pixel(p0 + f2);
    if !hev {
        let a = (f1 + 1) >> 1;
        px[5] = to_pixel(q1 - a);
        px[2] = to_pixel(p1 + a);
    }
}

/// Macroblock edge filter: adjusts p2..q2 with 27/18/9 weights, or only p0
/// and q0 on high variance.
fn mb_filter(px: &mut Taps, hev: bool) {
    let (p2, p1, p0) = (to_signed(px[1]), to_signed(px[2]), to_signed(px[3]));
    let (q0, q1, q2) = (to_signed(px[4]), to_signed(px[5]), to_signed(px[6]));
    let f = sclamp(sclamp(p1 - q1) + 3 * (q0 - p0));

    if hev {
        px[4] = to_pixel(q0 - (sclamp(f + 4) >> 3));
        px[3] = to_pixel(p0 + (sclamp(f + 3) >> 3));
        return;
    }

    let a = sclamp((27 * f + 63) >> 7);
    px[4] = to_pixel(q0 - a);
    px[3] = to_pixel(p0 + a);
    let a = sclamp((18 * f + 63) >> 7);
    px[5] = to_pixel(q1 - a);
    px[2] = to_pixel(p1 + a);
    let a = sclamp((9 * f + 63) >> 7);
    px[6] = to_pixel(q2 - a);
    px[1] = to_pixel(p2 + a);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Macroblock,
    Inner,
}

/// Filter `len` pixels of an edge. `pos` is the first q0 pixel, `across`
/// the step across the edge and `along` the step along it.
#[allow(clippy::too_many_arguments)]
fn filter_edge(
    data: &mut [u8],
    pos: usize,
    across: usize,
    along: usize,
    len: usize,
    kind: EdgeKind,
    limits: &EdgeLimits,
    simple: bool,
) {
    let limit = match kind {
        EdgeKind::Macroblock => limits.mb_edge,
        EdgeKind::Inner => limits.edge,
    };

    for i in 0..len {
        let start = pos + i * along - 4 * across;
        let mut px: Taps = std::array::from_fn(|k| data[start + k * across]);

        if simple {
            if !edge_mask(&px, limit) {
                continue;
            }
            simple_filter(&mut px);
        } else {
            if !normal_mask(&px, limits.interior, limit) {
                continue;
            }
            let hev = high_edge_variance(&px, limits.hev_threshold);
            match kind {
                EdgeKind::Macroblock => mb_filter(&mut px, hev),
                EdgeKind::Inner => subblock_filter(&mut px, hev),
            }
        }

        for (k, &v) in px.iter().enumerate().take(7).skip(1) {
            data[start + k * across] = v;
        }
    }
}

/// Filter the edges of one `size` x `size` macroblock area of a plane.
#[allow(clippy::too_many_arguments)]
fn filter_macroblock(
    plane: &mut Plane,
    x0: usize,
    y0: usize,
    size: usize,
    left_edge: bool,
    top_edge: bool,
    inner_edges: bool,
    limits: &EdgeLimits,
    simple: bool,
) {
    let stride = plane.stride();
    let origin = plane.offset(x0 as isize, y0 as isize);
    let data = plane.data_mut();

    if left_edge {
        filter_edge(data, origin, 1, stride, size, EdgeKind::Macroblock, limits, simple);
    }
    if inner_edges {
        for x in (4..size).step_by(4) {
            filter_edge(data, origin + x, 1, stride, size, EdgeKind::Inner, limits, simple);
        }
    }
    if top_edge {
        filter_edge(data, origin, stride, 1, size, EdgeKind::Macroblock, limits, simple);
    }
    if inner_edges {
        for y in (4..size).step_by(4) {
            filter_edge(data, origin + y * stride, stride, 1, size, EdgeKind::Inner, limits, simple);
        }
    }
}

/// Apply the loop filter to an entire reconstructed frame.
pub fn filter_frame(
    frame: &mut FrameBuffer,
    grid: &MacroblockGrid,
    levels: &FilterLevels,
    params: &LoopFilterParams,
) {
    if params.level == 0 {
        return;
    }
    let simple = params.filter_type == FilterType::Simple;

    for mb_row in 0..grid.mb_rows() {
        for mb_col in 0..grid.mb_cols() {
            let info = grid.get(mb_row, mb_col);
            let level = levels.level(info);
            if level == 0 {
                continue;
            }
            let limits = EdgeLimits::new(level, params.sharpness, params.key_frame);
            let inner = !(info.skip_coeff && !info.y_mode.has_subblocks());
            let (left, top) = (mb_col > 0, mb_row > 0);

            filter_macroblock(&mut frame.y, mb_col * 16, mb_row * 16, 16, left, top, inner, &limits, simple);
            if !simple {
                for plane in [&mut frame.u, &mut frame.v] {
                    filter_macroblock(plane, mb_col * 8, mb_row * 8, 8, left, top, inner, &limits, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RefFrame;
    use pretty_assertions::assert_eq;

    fn step_frame() -> FrameBuffer {
        let mut frame = FrameBuffer::new(2, 1).unwrap();
        for y in 0..16 {
            for x in 0..32 {
                let off = frame.y.offset(x, y);
                frame.y.data_mut()[off] = if x < 16 { 80 } else { 100 };
            }
        }
        frame
    }

    fn filtered_row(simple: bool) -> Vec<u8> {
        let mut frame = step_frame();
        let grid = MacroblockGrid::new(2, 1);
        let levels = FilterLevels::new(32, &Segmentation::default(), &LoopFilterDeltas::default());
        let filter_type = if simple { FilterType::Simple } else { FilterType::Normal };
        let params = LoopFilterParams::new(32, 0, filter_type, true);
        filter_frame(&mut frame, &grid, &levels, &params);
        for y in 1..16 {
            assert_eq!(frame.y.row(y), frame.y.row(0));
        }
        frame.y.row(0)[12..20].to_vec()
    }

    #[test]
    fn test_compute_limits() {
        let l = EdgeLimits::new(32, 0, true);
        assert_eq!((l.interior, l.edge, l.mb_edge, l.hev_threshold), (32, 96, 100, 1));

        let l = EdgeLimits::new(32, 5, false);
        assert_eq!(l.interior, 4);
        assert_eq!(l.hev_threshold, 2);

        let l = EdgeLimits::new(0, 3, true);
        assert_eq!(l.interior, 1);
        assert_eq!(l.edge, 1);
    }

    #[test]
    fn test_hev_thresholds() {
        assert_eq!(hev_threshold(40, true), 2);
        assert_eq!(hev_threshold(40, false), 3);
        assert_eq!(hev_threshold(20, true), 1);
        assert_eq!(hev_threshold(20, false), 2);
        assert_eq!(hev_threshold(15, false), 1);
        assert_eq!(hev_threshold(14, true), 0);
    }

    #[test]
    fn test_filters_on_step_edge() {
        let mut px: Taps = [80, 80, 80, 80, 100, 100, 100, 100];
        simple_filter(&mut px);
        assert_eq!(px, [80, 80, 80, 85, 95, 100, 100, 100]);

        let mut px: Taps = [80, 80, 80, 80, 100, 100, 100, 100];
        subblock_filter(&mut px, false);
        assert_eq!(px, [80, 80, 84, 87, 92, 96, 100, 100]);

        let mut px: Taps = [80, 80, 80, 80, 100, 100, 100, 100];
        mb_filter(&mut px, false);
        assert_eq!(px, [80, 83, 86, 88, 92, 94, 97, 100]);
    }

    #[test]
    fn test_flat_area_unchanged() {
        let mut px: Taps = [50; 8];
        mb_filter(&mut px, true);
        subblock_filter(&mut px, false);
        simple_filter(&mut px);
        assert_eq!(px, [50; 8]);
    }

    #[test]
    fn test_frame_normal_filter() {
        assert_eq!(filtered_row(false), vec![80, 83, 86, 88, 92, 94, 97, 100]);
    }

    #[test]
    fn test_frame_simple_filter() {
        assert_eq!(filtered_row(true), vec![80, 80, 80, 85, 95, 100, 100, 100]);
    }

    #[test]
    fn test_level_zero_is_identity() {
        let mut frame = step_frame();
        let before = frame.clone();
        let grid = MacroblockGrid::new(2, 1);
        let levels = FilterLevels::new(0, &Segmentation::default(), &LoopFilterDeltas::default());
        filter_frame(&mut frame, &grid, &levels, &LoopFilterParams::new(0, 0, FilterType::Normal, true));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_levels_with_deltas() {
        let deltas = LoopFilterDeltas {
            enabled: true,
            ref_deltas: [2, -2, 3, -3],
            mode_deltas: [4, -4, 5, -5],
        };
        let levels = FilterLevels::new(30, &Segmentation::default(), &deltas);
        let info = |y_mode, ref_frame| MacroblockInfo {
            y_mode,
            ref_frame,
            ..Default::default()
        };
        assert_eq!(levels.level(&info(MbMode::BPred, RefFrame::Intra)), 36);
        assert_eq!(levels.level(&info(MbMode::DcPred, RefFrame::Intra)), 32);
        assert_eq!(levels.level(&info(MbMode::ZeroMv, RefFrame::Last)), 24);
        assert_eq!(levels.level(&info(MbMode::NewMv, RefFrame::Golden)), 38);
        assert_eq!(levels.level(&info(MbMode::SplitMv, RefFrame::AltRef)), 22);
    }

    #[test]
    fn test_levels_with_segments() {
        let seg = Segmentation {
            enabled: true,
            filter_level: [-40, 5, 70, 0],
            ..Default::default()
        };
        let levels = FilterLevels::new(30, &seg, &LoopFilterDeltas::default());
        let mut info = MacroblockInfo::default();
        let expected = [0, 35, 63, 30];
        for (id, &want) in expected.iter().enumerate() {
            info.segment_id = id as u8;
            assert_eq!(levels.level(&info), want);
        }

        let seg = Segmentation {
            abs_delta: true,
            ..seg
        };
        let levels = FilterLevels::new(30, &seg, &LoopFilterDeltas::default());
        info.segment_id = 1;
        assert_eq!(levels.level(&info), 5);
    }
}
