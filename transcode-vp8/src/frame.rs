//! VP8 frame buffers.
//!
//! Planes are stored with a replicated border so motion compensation can
//! read past the picture edge. Plane dimensions are the macroblock-aligned
//! decode size; [`DecodedFrame`] carries the display size.

use bitflags::bitflags;

use crate::error::{Result, Vp8Error};

/// Luma border in pixels.
pub const LUMA_BORDER: usize = 32;

/// Chroma border in pixels.
pub const CHROMA_BORDER: usize = LUMA_BORDER / 2;

/// Value of the row above the picture for intra prediction.
const ABOVE_EDGE: u8 = 127;

/// Value of the column left of the picture for intra prediction.
const LEFT_EDGE: u8 = 129;

bitflags! {
    /// Properties of a decoded frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// Intra-only frame.
        const KEYFRAME = 1 << 0;
        /// Frame is meant for display.
        const SHOW = 1 << 1;
        /// Frame data is damaged or predicted from damaged data.
        const CORRUPT = 1 << 2;
    }
}

/// One image plane with a border on every side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
    border: usize,
}

impl Plane {
    /// Allocate a plane of `width` x `height` pixels plus `border`.
    pub fn new(width: usize, height: usize, border: usize) -> Result<Self> {
        let stride = width + 2 * border;
        let rows = height + 2 * border;
        let bytes = stride * rows;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| Vp8Error::AllocationFailed { bytes })?;
        data.resize(bytes, 0);
        Ok(Self {
            data,
            width,
            height,
            stride,
            border,
        })
    }

    /// Width in pixels, excluding the border.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels, excluding the border.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distance between rows in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Border size in pixels.
    pub fn border(&self) -> usize {
        self.border
    }

    /// The whole buffer including the border.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the whole buffer.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Offset of pixel (`x`, `y`); negative coordinates address the border.
    #[inline]
    pub fn offset(&self, x: isize, y: isize) -> usize {
        ((y + self.border as isize) as usize) * self.stride + (x + self.border as isize) as usize
    }

    /// Pixel at (`x`, `y`).
    #[inline]
    pub fn pixel(&self, x: isize, y: isize) -> u8 {
        self.data[self.offset(x, y)]
    }

    /// Visible pixels of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = self.offset(0, y as isize);
        &self.data[start..start + self.width]
    }

    /// Prepare the edges read by intra prediction in a new frame.
    pub fn setup_intra_edges(&mut self) {
        let above = self.offset(-1, -1);
        self.data[above..above + self.width + 5].fill(ABOVE_EDGE);
        for y in 0..self.height as isize {
            let left = self.offset(-1, y);
            self.data[left] = LEFT_EDGE;
        }
    }

    /// Replicate the last pixel of row `y` four pixels to the right.
    pub fn extend_row_right(&mut self, y: usize) {
        let last = self.offset(self.width as isize - 1, y as isize);
        let value = self.data[last];
        self.data[last + 1..last + 5].fill(value);
    }

    /// Replicate edge pixels over the whole border.
    pub fn extend_borders(&mut self) {
        let (w, h, b, stride) = (self.width, self.height, self.border, self.stride);
        for y in b..b + h {
            let row = &mut self.data[y * stride..(y + 1) * stride];
            let left = row[b];
            let right = row[b + w - 1];
            row[..b].fill(left);
            row[b + w..].fill(right);
        }
        for y in 0..b {
            self.data.copy_within(b * stride..(b + 1) * stride, y * stride);
        }
        let last = (b + h - 1) * stride;
        for y in b + h..h + 2 * b {
            self.data.copy_within(last..last + stride, y * stride);
        }
    }
}

/// A reconstructed YUV 4:2:0 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Luma plane.
    pub y: Plane,
    /// Cb plane.
    pub u: Plane,
    /// Cr plane.
    pub v: Plane,
    /// Contents are damaged.
    pub corrupted: bool,
}

impl FrameBuffer {
    /// Allocate planes for a `mb_cols` x `mb_rows` macroblock picture.
    pub fn new(mb_cols: usize, mb_rows: usize) -> Result<Self> {
        Ok(Self {
            y: Plane::new(mb_cols * 16, mb_rows * 16, LUMA_BORDER)?,
            u: Plane::new(mb_cols * 8, mb_rows * 8, CHROMA_BORDER)?,
            v: Plane::new(mb_cols * 8, mb_rows * 8, CHROMA_BORDER)?,
            corrupted: false,
        })
    }

    /// Prepare intra prediction edges on all planes.
    pub fn setup_intra_edges(&mut self) {
        self.y.setup_intra_edges();
        self.u.setup_intra_edges();
        self.v.setup_intra_edges();
    }

    /// Replicate edge pixels over the border of all planes.
    pub fn extend_borders(&mut self) {
        self.y.extend_borders();
        self.u.extend_borders();
        self.v.extend_borders();
    }
}

/// A frame returned by [`Vp8Decoder::decode`](crate::Vp8Decoder::decode).
///
/// Borrows the decoder's buffer; copy with [`DecodedFrame::to_i420`] to keep
/// it past the next call.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    buffer: &'a FrameBuffer,
    width: u32,
    height: u32,
    horizontal_scale: u8,
    vertical_scale: u8,
    flags: FrameFlags,
}

impl<'a> DecodedFrame<'a> {
    pub(crate) fn new(
        buffer: &'a FrameBuffer,
        width: u32,
        height: u32,
        scale: (u8, u8),
        flags: FrameFlags,
    ) -> Self {
        Self {
            buffer,
            width,
            height,
            horizontal_scale: scale.0,
            vertical_scale: scale.1,
            flags,
        }
    }

    /// Display width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Display height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Luma plane.
    pub fn y(&self) -> &'a Plane {
        &self.buffer.y
    }

    /// Cb plane.
    pub fn u(&self) -> &'a Plane {
        &self.buffer.u
    }

    /// Cr plane.
    pub fn v(&self) -> &'a Plane {
        &self.buffer.v
    }

    /// Frame flags.
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Frame is a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(FrameFlags::KEYFRAME)
    }

    /// Frame is meant for display.
    pub fn is_shown(&self) -> bool {
        self.flags.contains(FrameFlags::SHOW)
    }

    /// Frame is damaged or predicted from a damaged reference.
    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(FrameFlags::CORRUPT)
    }

    /// Horizontal upscaling hint from the last keyframe.
    pub fn horizontal_scale(&self) -> u8 {
        self.horizontal_scale
    }

    /// Vertical upscaling hint from the last keyframe.
    pub fn vertical_scale(&self) -> u8 {
        self.vertical_scale
    }

    /// Copy the visible area into a packed I420 buffer.
    pub fn to_i420(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
        let mut out = Vec::with_capacity(w * h + 2 * cw * ch);
        for y in 0..h {
            out.extend_from_slice(&self.buffer.y.row(y)[..w]);
        }
        for plane in [&self.buffer.u, &self.buffer.v] {
            for y in 0..ch {
                out.extend_from_slice(&plane.row(y)[..cw]);
            }
        }
        out
    }
}
