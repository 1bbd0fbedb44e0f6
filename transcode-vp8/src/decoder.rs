//! VP8 video decoder.

use crate::bool_decoder::BoolDecoder;
use crate::buffers::FrameBufferManager;
use crate::context::FrameContext;
use crate::error::{Result, Vp8Error};
use crate::frame::{DecodedFrame, FrameBuffer, FrameFlags};
use crate::header::{
    split_partitions, FrameHeader, KeyframeDimensions, LoopFilterDeltas, Segmentation,
    UncompressedHeader, FRAME_TAG_SIZE,
};
use crate::inter::InterpFilter;
use crate::loop_filter::{filter_frame, FilterLevels, LoopFilterParams};
use crate::modemv::{MacroblockGrid, ModeParams};
use crate::quant::DequantFactors;
use crate::recon::{inverse_transform, Reconstructor};
use crate::tokens::{MacroblockCoeffs, TokenContext};
use crate::RefFrame;

/// Largest width or height a keyframe can signal.
pub const MAX_DIMENSION: u32 = 0x3fff;

/// VP8 decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vp8DecoderConfig {
    /// Maximum width.
    pub max_width: u32,
    /// Maximum height.
    pub max_height: u32,
}

impl Default for Vp8DecoderConfig {
    fn default() -> Self {
        Self {
            max_width: 4096,
            max_height: 4096,
        }
    }
}

impl Vp8DecoderConfig {
    /// Check that the limits are usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("max_width", self.max_width), ("max_height", self.max_height)] {
            if value == 0 || value > MAX_DIMENSION {
                return Err(Vp8Error::InvalidParameter {
                    reason: format!("{} must be in 1..={}, got {}", name, MAX_DIMENSION, value),
                });
            }
        }
        Ok(())
    }
}

/// Everything sized by the keyframe dimensions.
#[derive(Debug)]
struct StreamState {
    width: u32,
    height: u32,
    scale: (u8, u8),
    mb_cols: usize,
    mb_rows: usize,
    buffers: FrameBufferManager,
    grid: MacroblockGrid,
}

/// VP8 video decoder.
///
/// Feed one compressed frame per [`decode`](Self::decode) call. The returned
/// frame borrows the decoder and is overwritten by the next call.
#[derive(Debug)]
pub struct Vp8Decoder {
    /// Decoder configuration.
    config: Vp8DecoderConfig,
    /// Buffers and mode grid, allocated by the first keyframe.
    stream: Option<StreamState>,
    /// Persistent entropy state.
    context: FrameContext,
    /// Persistent segmentation state.
    segmentation: Segmentation,
    /// Persistent loop filter deltas.
    lf_deltas: LoopFilterDeltas,
    /// Inter frames are rejected until a keyframe decodes.
    awaiting_keyframe: bool,
    /// Frames decoded successfully.
    frame_count: u64,
}

impl Vp8Decoder {
    /// Create a new VP8 decoder.
    pub fn new() -> Self {
        Self {
            config: Vp8DecoderConfig::default(),
            stream: None,
            context: FrameContext::default(),
            segmentation: Segmentation::default(),
            lf_deltas: LoopFilterDeltas::default(),
            awaiting_keyframe: true,
            frame_count: 0,
        }
    }

    /// Create a new VP8 decoder with configuration.
    pub fn with_config(config: Vp8DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Get decoder configuration.
    pub fn config(&self) -> &Vp8DecoderConfig {
        &self.config
    }

    /// Display dimensions of the current stream, (0, 0) before a keyframe.
    pub fn dimensions(&self) -> (u32, u32) {
        self.stream
            .as_ref()
            .map_or((0, 0), |s| (s.width, s.height))
    }

    /// Number of frames decoded successfully.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Probabilities carried into the next frame.
    pub fn entropy_context(&self) -> &FrameContext {
        &self.context
    }

    /// True until a keyframe has been decoded, and again after a damaged
    /// keyframe.
    pub fn is_awaiting_keyframe(&self) -> bool {
        self.awaiting_keyframe
    }

    /// Drop all stream state; the next frame must be a keyframe.
    pub fn reset(&mut self) {
        *self = Self {
            config: self.config.clone(),
            ..Self::new()
        };
    }

    /// Decode one compressed frame.
    #[tracing::instrument(level = "trace", skip(self, data), fields(codec = "vp8", size = data.len()))]
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedFrame<'_>> {
        let key_frame = data.len() >= FRAME_TAG_SIZE && data[0] & 1 == 0;
        let flags = match self.decode_frame(data, key_frame) {
            Ok(flags) => flags,
            Err(err) => return Err(self.recover(key_frame, err)),
        };
        self.frame_count += 1;

        match self.stream.as_ref() {
            Some(s) => Ok(DecodedFrame::new(
                s.buffers.frame_to_show(),
                s.width,
                s.height,
                s.scale,
                flags,
            )),
            None => Err(Vp8Error::MissingKeyframe),
        }
    }

    /// Apply the per-frame recovery policy to a failed decode.
    fn recover(&mut self, key_frame: bool, err: Vp8Error) -> Vp8Error {
        if key_frame {
            self.awaiting_keyframe = true;
            tracing::warn!(error = %err, "keyframe failed to decode, waiting for the next one");
            return match err {
                Vp8Error::CorruptFrame { reason } => Vp8Error::CorruptKeyframe { reason },
                other => other,
            };
        }

        match &err {
            Vp8Error::CorruptFrame { reason } => {
                tracing::warn!(reason = %reason, "corrupt inter frame");
                // The lost frame may have been meant to replace last
                if let Some(s) = self.stream.as_mut() {
                    s.buffers.get_mut(RefFrame::Last).corrupted = true;
                }
            }
            Vp8Error::MissingKeyframe => {
                tracing::warn!("dropping inter frame while waiting for a keyframe");
            }
            _ => {}
        }
        err
    }

    /// Allocate or reuse stream state for keyframe dimensions.
    fn configure(&mut self, dims: KeyframeDimensions) -> Result<()> {
        let (width, height) = (dims.width as u32, dims.height as u32);
        if width > self.config.max_width || height > self.config.max_height {
            return Err(Vp8Error::DimensionsTooLarge {
                width,
                height,
                max_width: self.config.max_width,
                max_height: self.config.max_height,
            });
        }

        let scale = (dims.horizontal_scale, dims.vertical_scale);
        if let Some(s) = self.stream.as_mut() {
            if s.width == width && s.height == height {
                s.scale = scale;
                return Ok(());
            }
        }

        let mb_cols = (width as usize + 15) / 16;
        let mb_rows = (height as usize + 15) / 16;
        tracing::debug!(width, height, mb_cols, mb_rows, "allocating frame buffers");
        // Release the old buffers before allocating new ones
        self.stream = None;
        self.stream = Some(StreamState {
            width,
            height,
            scale,
            mb_cols,
            mb_rows,
            buffers: FrameBufferManager::new(mb_cols, mb_rows)?,
            grid: MacroblockGrid::new(mb_cols, mb_rows),
        });
        Ok(())
    }

    /// Decode a frame, rolling back header state if the frame is rejected.
    fn decode_frame(&mut self, data: &[u8], key_frame: bool) -> Result<FrameFlags> {
        let saved = SavedState {
            context: self.context.clone(),
            segmentation: self.segmentation,
            lf_deltas: self.lf_deltas,
        };

        let committed = match self.commit_frame(data, key_frame) {
            Ok(committed) => committed,
            Err(err) => {
                self.context = saved.context;
                self.segmentation = saved.segmentation;
                self.lf_deltas = saved.lf_deltas;
                return Err(err);
            }
        };

        // Updates of this frame only apply to it
        if !committed.refresh_entropy_probs {
            self.context = saved.context;
        }
        if committed.overrun {
            return Err(Vp8Error::corrupt("frame data ends early"));
        }
        if key_frame {
            self.awaiting_keyframe = false;
        }
        Ok(committed.flags)
    }

    /// Decode and reconstruct a frame, then update the reference buffers.
    ///
    /// An inter frame whose token data runs out is still committed, marked
    /// corrupt.
    fn commit_frame(&mut self, data: &[u8], key_frame: bool) -> Result<CommittedFrame> {
        let uh = UncompressedHeader::parse(data)?;
        let tag = uh.tag;

        if let Some(dims) = uh.dimensions {
            self.configure(dims)?;
            self.context.reset();
            self.segmentation = Segmentation::default();
            self.lf_deltas = LoopFilterDeltas::default();
        } else if self.awaiting_keyframe {
            return Err(Vp8Error::MissingKeyframe);
        }
        let stream = self.stream.as_mut().ok_or(Vp8Error::MissingKeyframe)?;

        let mut bd = BoolDecoder::new(&data[uh.size..]);
        let hdr = FrameHeader::parse(
            &mut bd,
            key_frame,
            &mut self.segmentation,
            &mut self.lf_deltas,
            &mut self.context,
        )?;
        let partitions = split_partitions(data, uh.first_partition_end(), hdr.num_partitions)?;

        tracing::debug!(
            key_frame,
            version = tag.version,
            show = tag.show_frame,
            size = data.len(),
            q_index = hdr.quant.y_ac_qi,
            filter_level = hdr.filter_level,
            partitions = hdr.num_partitions,
            "decoding frame"
        );

        let params = ModeParams {
            key_frame,
            header: &hdr,
            segmentation: &self.segmentation,
            context: &self.context,
        };
        stream.grid.decode_modes(&mut bd, &params);

        stream.buffers.acquire()?;
        let (target, refs) = stream.buffers.split_for_decode();
        let frame = FrameDecode {
            key_frame,
            filter: if tag.uses_bilinear() {
                InterpFilter::Bilinear
            } else {
                InterpFilter::SixTap
            },
            full_pixel: tag.full_pixel(),
            mb_cols: stream.mb_cols,
            mb_rows: stream.mb_rows,
        };
        let result = frame.reconstruct(
            target,
            refs,
            &mut stream.grid,
            &partitions,
            &hdr,
            &self.segmentation,
            &self.context,
        );

        let overrun = match result {
            Ok(tokens_overrun) => tokens_overrun || bd.is_corrupt(),
            Err(err) => {
                stream.buffers.abandon();
                return Err(err);
            }
        };
        if overrun && key_frame {
            stream.buffers.abandon();
            return Err(Vp8Error::corrupt("keyframe data ends early"));
        }

        let levels = FilterLevels::new(hdr.filter_level, &self.segmentation, &self.lf_deltas);
        let lf = LoopFilterParams::new(hdr.filter_level, hdr.sharpness, hdr.filter_type, key_frame);
        let target = stream.buffers.get_mut(RefFrame::Intra);
        filter_frame(target, &stream.grid, &levels, &lf);
        target.extend_borders();
        target.corrupted |= overrun;

        stream.buffers.swap(&hdr);

        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::KEYFRAME, key_frame);
        flags.set(FrameFlags::SHOW, tag.show_frame);
        flags.set(FrameFlags::CORRUPT, stream.buffers.frame_to_show().corrupted);
        if flags.contains(FrameFlags::CORRUPT) && !overrun {
            tracing::warn!("frame predicted from a corrupt reference");
        }
        Ok(CommittedFrame {
            flags,
            overrun,
            refresh_entropy_probs: hdr.refresh_entropy_probs,
        })
    }
}

/// Header state a rejected frame must not change.
struct SavedState {
    context: FrameContext,
    segmentation: Segmentation,
    lf_deltas: LoopFilterDeltas,
}

/// Outcome of a frame that reached the reference buffers.
#[derive(Debug, Clone, Copy)]
struct CommittedFrame {
    flags: FrameFlags,
    overrun: bool,
    refresh_entropy_probs: bool,
}

impl Default for Vp8Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame-wide settings for the macroblock loop.
#[derive(Debug, Clone, Copy)]
struct FrameDecode {
    key_frame: bool,
    filter: InterpFilter,
    full_pixel: bool,
    mb_cols: usize,
    mb_rows: usize,
}

impl FrameDecode {
    /// Decode tokens and reconstruct every macroblock into `target`.
    ///
    /// Returns true if a token partition ran out of data. Sets
    /// `target.corrupted` when a used reference is corrupt.
    #[allow(clippy::too_many_arguments)]
    fn reconstruct(
        &self,
        target: &mut FrameBuffer,
        refs: [Option<&FrameBuffer>; 4],
        grid: &mut MacroblockGrid,
        partitions: &[&[u8]],
        hdr: &FrameHeader,
        segmentation: &Segmentation,
        context: &FrameContext,
    ) -> Result<bool> {
        let recon = Reconstructor::new(refs, self.filter, self.full_pixel, self.mb_cols, self.mb_rows);
        let factors = DequantFactors::for_segments(&hdr.quant, segmentation);
        let mut decoders: Vec<BoolDecoder<'_>> =
            partitions.iter().map(|p| BoolDecoder::new(p)).collect();
        if decoders.is_empty() {
            return Err(Vp8Error::corrupt("no token partitions"));
        }
        let num_decoders = decoders.len();
        let mut tokens = TokenContext::new(self.mb_cols);

        target.setup_intra_edges();
        target.corrupted = false;

        for mb_row in 0..self.mb_rows {
            tokens.start_row();
            let bd = &mut decoders[mb_row % num_decoders];

            for mb_col in 0..self.mb_cols {
                let info = grid.get_mut(mb_row, mb_col);
                if !self.key_frame && info.ref_frame != RefFrame::Intra {
                    target.corrupted |= recon.reference(info.ref_frame).map_or(true, |r| r.corrupted);
                }

                let has_y2 = !info.y_mode.has_subblocks();
                let residual = if info.skip_coeff {
                    tokens.skip_macroblock(mb_col, has_y2);
                    None
                } else {
                    let mut coeffs: MacroblockCoeffs = [[0; 16]; 25];
                    let nonzero =
                        tokens.decode_macroblock(bd, &context.coeff_probs, mb_col, has_y2, &mut coeffs);
                    if nonzero {
                        let q = &factors[info.segment_id as usize % factors.len()];
                        Some(inverse_transform(&mut coeffs, q, has_y2))
                    } else {
                        // Without a Y2 block the mode filters inner edges anyway
                        info.skip_coeff = has_y2;
                        None
                    }
                };

                recon.macroblock(target, info, mb_row, mb_col, residual.as_ref())?;
            }

            target.y.extend_row_right(mb_row * 16 + 15);
        }

        Ok(decoders.iter().any(|bd| bd.is_corrupt()))
    }
}
