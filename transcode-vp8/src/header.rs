//! VP8 frame header parsing.
//!
//! A frame starts with an uncompressed 3-byte tag (plus start code and
//! dimensions on keyframes). The rest of the header is bool-coded at the
//! start of the first partition, followed by the per-macroblock modes.

use crate::bool_decoder::BoolDecoder;
use crate::context::FrameContext;
use crate::error::{Result, Vp8Error};

/// Keyframe start code following the frame tag.
pub const KEYFRAME_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Size of the frame tag.
pub const FRAME_TAG_SIZE: usize = 3;

/// Size of the uncompressed keyframe header including the tag.
pub const KEYFRAME_HEADER_SIZE: usize = 10;

/// Maximum number of token partitions.
pub const MAX_PARTITIONS: usize = 8;

/// Number of segments.
pub const MAX_SEGMENTS: usize = 4;

/// The 3-byte tag present on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {
    /// Keyframe (intra only).
    pub key_frame: bool,
    /// Bitstream version (0-3).
    pub version: u8,
    /// Frame is meant for display.
    pub show_frame: bool,
    /// Size of the first partition in bytes.
    pub first_part_size: usize,
}

impl FrameTag {
    /// Parse the tag from the first three bytes of a frame.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_TAG_SIZE {
            return Err(Vp8Error::corrupt("truncated packet"));
        }
        let raw = data[0] as u32 | (data[1] as u32) << 8 | (data[2] as u32) << 16;
        Ok(Self {
            key_frame: raw & 1 == 0,
            version: ((raw >> 1) & 7) as u8,
            show_frame: (raw >> 4) & 1 != 0,
            first_part_size: (raw >> 5) as usize,
        })
    }

    /// Sub-pixel interpolation uses the bilinear filter.
    pub fn uses_bilinear(&self) -> bool {
        self.version != 0
    }

    /// Chroma motion vectors are rounded to whole pixels.
    pub fn full_pixel(&self) -> bool {
        self.version == 3
    }
}

/// Dimensions carried by a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyframeDimensions {
    /// Coded width in pixels.
    pub width: u16,
    /// Coded height in pixels.
    pub height: u16,
    /// Horizontal upscaling hint (0-3).
    pub horizontal_scale: u8,
    /// Vertical upscaling hint (0-3).
    pub vertical_scale: u8,
}

/// The uncompressed part of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncompressedHeader {
    /// Frame tag.
    pub tag: FrameTag,
    /// Keyframe dimensions.
    pub dimensions: Option<KeyframeDimensions>,
    /// Bytes preceding the first partition.
    pub size: usize,
}

impl UncompressedHeader {
    /// Parse and validate the uncompressed header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let tag = FrameTag::parse(data)?;
        if tag.version > 3 {
            return Err(Vp8Error::unsupported(format!(
                "bitstream version {}",
                tag.version
            )));
        }
        if tag.first_part_size > data.len() - FRAME_TAG_SIZE {
            return Err(Vp8Error::corrupt(
                "truncated packet or corrupt partition 0 length",
            ));
        }
        if !tag.key_frame {
            return Ok(Self {
                tag,
                dimensions: None,
                size: FRAME_TAG_SIZE,
            });
        }

        if data.len() < KEYFRAME_HEADER_SIZE {
            return Err(Vp8Error::corrupt("truncated keyframe header"));
        }
        if data[3..6] != KEYFRAME_START_CODE {
            return Err(Vp8Error::unsupported("invalid keyframe start code"));
        }
        let w = u16::from_le_bytes([data[6], data[7]]);
        let h = u16::from_le_bytes([data[8], data[9]]);
        let dimensions = KeyframeDimensions {
            width: w & 0x3fff,
            height: h & 0x3fff,
            horizontal_scale: (w >> 14) as u8,
            vertical_scale: (h >> 14) as u8,
        };
        if dimensions.width == 0 || dimensions.height == 0 {
            return Err(Vp8Error::InvalidDimensions {
                width: dimensions.width as u32,
                height: dimensions.height as u32,
            });
        }

        Ok(Self {
            tag,
            dimensions: Some(dimensions),
            size: KEYFRAME_HEADER_SIZE,
        })
    }

    /// Offset of the token partition area.
    pub fn first_partition_end(&self) -> usize {
        self.size + self.tag.first_part_size
    }
}

/// Segment-based adjustments. Persist across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmentation {
    /// Segmentation is active for this frame.
    pub enabled: bool,
    /// This frame codes a segment id per macroblock.
    pub update_map: bool,
    /// This frame replaces the segment data.
    pub update_data: bool,
    /// Segment values replace rather than adjust the frame values.
    pub abs_delta: bool,
    /// Quantizer index value per segment.
    pub quant: [i8; MAX_SEGMENTS],
    /// Loop filter level value per segment.
    pub filter_level: [i8; MAX_SEGMENTS],
    /// Segment id tree probabilities.
    pub tree_probs: [u8; 3],
}

impl Default for Segmentation {
    fn default() -> Self {
        Self {
            enabled: false,
            update_map: false,
            update_data: false,
            abs_delta: false,
            quant: [0; MAX_SEGMENTS],
            filter_level: [0; MAX_SEGMENTS],
            tree_probs: [255; 3],
        }
    }
}

impl Segmentation {
    fn read(&mut self, bd: &mut BoolDecoder<'_>) {
        self.enabled = bd.read_flag();
        if !self.enabled {
            self.update_map = false;
            self.update_data = false;
            return;
        }

        self.update_map = bd.read_flag();
        self.update_data = bd.read_flag();
        if self.update_data {
            self.abs_delta = bd.read_flag();
            for q in self.quant.iter_mut() {
                *q = bd.read_optional_signed(7) as i8;
            }
            for lf in self.filter_level.iter_mut() {
                *lf = bd.read_optional_signed(6) as i8;
            }
        }
        if self.update_map {
            for p in self.tree_probs.iter_mut() {
                *p = if bd.read_flag() {
                    bd.read_literal(8) as u8
                } else {
                    255
                };
            }
        }
    }
}

/// Loop filter adjustments by reference frame and mode. Persist across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopFilterDeltas {
    /// Deltas are applied.
    pub enabled: bool,
    /// Indexed by [`RefFrame`](crate::RefFrame).
    pub ref_deltas: [i8; 4],
    /// B_PRED, ZEROMV, other MV modes, SPLITMV.
    pub mode_deltas: [i8; 4],
}

impl LoopFilterDeltas {
    fn read(&mut self, bd: &mut BoolDecoder<'_>) {
        self.enabled = bd.read_flag();
        if self.enabled && bd.read_flag() {
            for d in self.ref_deltas.iter_mut().chain(self.mode_deltas.iter_mut()) {
                if bd.read_flag() {
                    *d = bd.read_signed(6) as i8;
                }
            }
        }
    }
}

/// Loop filter variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Normal filter on all planes.
    #[default]
    Normal,
    /// Simple filter on luma only.
    Simple,
}

/// Quantizer indices of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantIndices {
    /// Base index (luma AC).
    pub y_ac_qi: i32,
    /// Luma DC delta.
    pub y_dc_delta: i32,
    /// Y2 DC delta.
    pub y2_dc_delta: i32,
    /// Y2 AC delta.
    pub y2_ac_delta: i32,
    /// Chroma DC delta.
    pub uv_dc_delta: i32,
    /// Chroma AC delta.
    pub uv_ac_delta: i32,
}

/// Source of a golden or altref buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferCopy {
    /// Keep the current buffer.
    #[default]
    None,
    /// Copy the last frame.
    Last,
    /// Copy the other long-term reference (altref for golden, golden for altref).
    Other,
}

impl BufferCopy {
    fn read(bd: &mut BoolDecoder<'_>) -> Result<Self> {
        match bd.read_literal(2) {
            0 => Ok(BufferCopy::None),
            1 => Ok(BufferCopy::Last),
            2 => Ok(BufferCopy::Other),
            value => {
                tracing::warn!(value, "invalid reference buffer copy");
                Err(Vp8Error::corrupt("invalid reference buffer copy"))
            }
        }
    }
}

/// Per-frame values of the compressed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Color space bit (keyframes).
    pub color_space: u8,
    /// Reconstruction clamping is not required (keyframes).
    pub clamping_type: u8,
    /// Loop filter variant.
    pub filter_type: FilterType,
    /// Base loop filter level (0-63).
    pub filter_level: u8,
    /// Loop filter sharpness (0-7).
    pub sharpness: u8,
    /// Number of token partitions.
    pub num_partitions: usize,
    /// Quantizer indices.
    pub quant: QuantIndices,
    /// Golden is replaced by this frame.
    pub refresh_golden: bool,
    /// Altref is replaced by this frame.
    pub refresh_altref: bool,
    /// Copy applied to golden before refresh.
    pub copy_to_golden: BufferCopy,
    /// Copy applied to altref before refresh.
    pub copy_to_altref: BufferCopy,
    /// Golden motion vectors are sign inverted.
    pub sign_bias_golden: bool,
    /// Altref motion vectors are sign inverted.
    pub sign_bias_altref: bool,
    /// Probability updates persist after this frame.
    pub refresh_entropy_probs: bool,
    /// Last is replaced by this frame.
    pub refresh_last: bool,
    /// Macroblocks carry a skip flag.
    pub mb_no_coeff_skip: bool,
    /// Probability that a macroblock has coefficients.
    pub prob_skip_false: u8,
    /// Probability of an intra macroblock (inter frames).
    pub prob_intra: u8,
    /// Probability of the last reference (inter frames).
    pub prob_last: u8,
    /// Probability of golden over altref (inter frames).
    pub prob_golden: u8,
}

impl FrameHeader {
    /// Parse the compressed header from the start of the first partition.
    ///
    /// Persistent segmentation, loop filter deltas and entropy state are
    /// updated in place. The caller resets them first on keyframes.
    pub fn parse(
        bd: &mut BoolDecoder<'_>,
        key_frame: bool,
        segmentation: &mut Segmentation,
        deltas: &mut LoopFilterDeltas,
        ctx: &mut FrameContext,
    ) -> Result<Self> {
        let mut hdr = FrameHeader::default();

        if key_frame {
            hdr.color_space = bd.read_flag() as u8;
            hdr.clamping_type = bd.read_flag() as u8;
        }

        segmentation.read(bd);

        hdr.filter_type = if bd.read_flag() {
            FilterType::Simple
        } else {
            FilterType::Normal
        };
        hdr.filter_level = bd.read_literal(6) as u8;
        hdr.sharpness = bd.read_literal(3) as u8;
        deltas.read(bd);

        hdr.num_partitions = 1 << bd.read_literal(2);

        hdr.quant = QuantIndices {
            y_ac_qi: bd.read_literal(7) as i32,
            y_dc_delta: bd.read_optional_signed(4),
            y2_dc_delta: bd.read_optional_signed(4),
            y2_ac_delta: bd.read_optional_signed(4),
            uv_dc_delta: bd.read_optional_signed(4),
            uv_ac_delta: bd.read_optional_signed(4),
        };

        if key_frame {
            hdr.refresh_golden = true;
            hdr.refresh_altref = true;
        } else {
            hdr.refresh_golden = bd.read_flag();
            hdr.refresh_altref = bd.read_flag();
            if !hdr.refresh_golden {
                hdr.copy_to_golden = BufferCopy::read(bd)?;
            }
            if !hdr.refresh_altref {
                hdr.copy_to_altref = BufferCopy::read(bd)?;
            }
            hdr.sign_bias_golden = bd.read_flag();
            hdr.sign_bias_altref = bd.read_flag();
        }

        hdr.refresh_entropy_probs = bd.read_flag();
        hdr.refresh_last = key_frame || bd.read_flag();

        ctx.read_coeff_updates(bd);

        hdr.mb_no_coeff_skip = bd.read_flag();
        if hdr.mb_no_coeff_skip {
            hdr.prob_skip_false = bd.read_literal(8) as u8;
        }

        if !key_frame {
            hdr.prob_intra = bd.read_literal(8) as u8;
            hdr.prob_last = bd.read_literal(8) as u8;
            hdr.prob_golden = bd.read_literal(8) as u8;
            ctx.read_mode_updates(bd);
            ctx.read_mv_updates(bd);
        }

        Ok(hdr)
    }
}

/// Split the token area into its partitions.
///
/// `first_end` is the offset just past the first partition. Every partition
/// but the last is preceded by a 3-byte little-endian size; the last takes
/// the remaining bytes. Empty or overlong partitions are corrupt.
pub fn split_partitions(data: &[u8], first_end: usize, count: usize) -> Result<Vec<&[u8]>> {
    let sizes_len = 3 * (count - 1);
    if first_end + sizes_len > data.len() {
        return Err(Vp8Error::corrupt("truncated partition size data"));
    }

    let sizes = &data[first_end..first_end + sizes_len];
    let mut start = first_end + sizes_len;
    let mut partitions = Vec::with_capacity(count);
    for i in 0..count {
        let remaining = data.len() - start;
        let size = if i + 1 < count {
            let s = &sizes[3 * i..3 * i + 3];
            s[0] as usize | (s[1] as usize) << 8 | (s[2] as usize) << 16
        } else {
            remaining
        };
        if size == 0 || size > remaining {
            return Err(Vp8Error::corrupt(format!(
                "truncated packet or corrupt partition {} length",
                i + 1
            )));
        }
        partitions.push(&data[start..start + size]);
        start += size;
    }
    Ok(partitions)
}
