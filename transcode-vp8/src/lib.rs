//! VP8 video decoder.
//!
//! This crate provides a bit-exact VP8 decoder for the transcode library.
//! VP8 is an open, royalty-free video codec developed by On2 Technologies
//! and now owned by Google. It is commonly carried in WebM and RTP.
//!
//! ## Features
//!
//! - Keyframe and interframe decoding
//! - Multiple reference frames (Last, Golden, AltRef) with copy/refresh rules
//! - Six-tap and bilinear motion compensation, SPLITMV partitions
//! - Segmentation, loop filter deltas, normal and simple loop filters
//! - Corruption tracking across the reference chain
//!
//! ## Example
//!
//! ```no_run
//! use transcode_vp8::Vp8Decoder;
//!
//! # fn main() -> transcode_vp8::Result<()> {
//! # let packets: Vec<Vec<u8>> = Vec::new();
//! let mut decoder = Vp8Decoder::new();
//! for packet in &packets {
//!     let frame = decoder.decode(packet)?;
//!     if frame.is_shown() {
//!         let y = frame.y();
//!         println!("{}x{} row0={:?}", frame.width(), frame.height(), &y.row(0)[..4]);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod bool_decoder;
pub mod buffers;
pub mod context;
pub mod error;
pub mod frame;
pub mod header;
pub mod inter;
pub mod loop_filter;
pub mod modemv;
pub mod prediction;
pub mod quant;
pub mod recon;
pub mod tables;
pub mod tokens;
pub mod transform;
pub mod tree;
mod decoder;

pub use bool_decoder::{BoolDecoder, BoolEncoder};
pub use decoder::{Vp8Decoder, Vp8DecoderConfig};
pub use error::{Result, Vp8Error};
pub use frame::{DecodedFrame, FrameFlags, Plane};
pub use header::{FrameHeader, FrameTag};

/// Macroblock prediction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum MbMode {
    /// DC prediction.
    #[default]
    DcPred,
    /// Vertical prediction.
    VPred,
    /// Horizontal prediction.
    HPred,
    /// True motion prediction.
    TmPred,
    /// Per-subblock intra modes.
    BPred,
    /// Nearest neighbour vector.
    NearestMv,
    /// Second neighbour vector.
    NearMv,
    /// Zero vector.
    ZeroMv,
    /// Explicitly coded vector.
    NewMv,
    /// Per-partition vectors.
    SplitMv,
}

impl MbMode {
    /// Map an intra mode tree leaf (DC, V, H, TM, B_PRED).
    pub fn from_intra(leaf: u8) -> Self {
        match leaf {
            0 => MbMode::DcPred,
            1 => MbMode::VPred,
            2 => MbMode::HPred,
            3 => MbMode::TmPred,
            _ => MbMode::BPred,
        }
    }

    /// Map an inter mode tree leaf (zero, nearest, near, new, split).
    pub fn from_inter(leaf: u8) -> Self {
        match leaf {
            0 => MbMode::ZeroMv,
            1 => MbMode::NearestMv,
            2 => MbMode::NearMv,
            3 => MbMode::NewMv,
            _ => MbMode::SplitMv,
        }
    }

    /// Mode is predicted from a reference frame.
    pub fn is_inter(self) -> bool {
        matches!(
            self,
            MbMode::NearestMv | MbMode::NearMv | MbMode::ZeroMv | MbMode::NewMv | MbMode::SplitMv
        )
    }

    /// Mode has no second-order luma block.
    pub fn has_subblocks(self) -> bool {
        matches!(self, MbMode::BPred | MbMode::SplitMv)
    }

    /// Sub-block mode implied by a whole-macroblock intra mode, used as
    /// keyframe context by neighbouring B_PRED macroblocks.
    pub fn implied_bmode(self) -> BMode {
        match self {
            MbMode::VPred => BMode::Ve,
            MbMode::HPred => BMode::He,
            MbMode::TmPred => BMode::Tm,
            _ => BMode::Dc,
        }
    }
}

/// 4x4 sub-block intra prediction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BMode {
    /// DC.
    #[default]
    Dc,
    /// True motion.
    Tm,
    /// Vertical, smoothed.
    Ve,
    /// Horizontal, smoothed.
    He,
    /// Down-left diagonal.
    Ld,
    /// Down-right diagonal.
    Rd,
    /// Vertical-right.
    Vr,
    /// Vertical-left.
    Vl,
    /// Horizontal-down.
    Hd,
    /// Horizontal-up.
    Hu,
}

impl BMode {
    /// All modes in tree leaf order.
    pub const ALL: [BMode; 10] = [
        BMode::Dc,
        BMode::Tm,
        BMode::Ve,
        BMode::He,
        BMode::Ld,
        BMode::Rd,
        BMode::Vr,
        BMode::Vl,
        BMode::Hd,
        BMode::Hu,
    ];

    /// Map a sub-block mode tree leaf.
    pub fn from_leaf(leaf: u8) -> Self {
        Self::ALL[leaf as usize % 10]
    }
}

/// Reference frame of a macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum RefFrame {
    /// Intra predicted.
    #[default]
    Intra = 0,
    /// Previous frame.
    Last = 1,
    /// Golden frame.
    Golden = 2,
    /// Alternate reference frame.
    AltRef = 3,
}

/// Motion vector in quarter-pel units, stored doubled so the low three bits
/// give the eighth-pel filter phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MotionVector {
    /// Vertical component.
    pub row: i16,
    /// Horizontal component.
    pub col: i16,
}

impl MotionVector {
    /// Zero vector.
    pub const ZERO: MotionVector = MotionVector { row: 0, col: 0 };

    /// Create a vector.
    pub const fn new(row: i16, col: i16) -> Self {
        Self { row, col }
    }

    /// Both components are zero.
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Component-wise negation.
    pub fn negate(self) -> Self {
        Self::new(self.row.wrapping_neg(), self.col.wrapping_neg())
    }
}
