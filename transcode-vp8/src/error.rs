//! VP8 decoder error types.

use thiserror::Error;

/// VP8 decoder error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Vp8Error {
    /// The frame is damaged; later frames can still be decoded.
    #[error("Corrupt VP8 frame: {reason}")]
    CorruptFrame {
        /// What was found to be inconsistent.
        reason: String,
    },

    /// A keyframe is damaged and the reference chain is broken.
    #[error("Corrupt VP8 keyframe: {reason}")]
    CorruptKeyframe {
        /// What was found to be inconsistent.
        reason: String,
    },

    /// An inter frame arrived without a valid keyframe to predict from.
    #[error("No valid keyframe available for inter frame")]
    MissingKeyframe,

    /// The bitstream signals something this decoder does not implement.
    #[error("Unsupported VP8 feature: {feature}")]
    UnsupportedFeature {
        /// Description of the feature.
        feature: String,
    },

    /// The caller supplied an inconsistent configuration.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Which parameter was rejected and why.
        reason: String,
    },

    /// Keyframe dimensions are zero.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Coded width.
        width: u32,
        /// Coded height.
        height: u32,
    },

    /// Keyframe dimensions exceed the configured limits.
    #[error("Dimensions {width}x{height} exceed maximum {max_width}x{max_height}")]
    DimensionsTooLarge {
        /// Coded width.
        width: u32,
        /// Coded height.
        height: u32,
        /// Configured maximum width.
        max_width: u32,
        /// Configured maximum height.
        max_height: u32,
    },

    /// A frame buffer could not be allocated.
    #[error("Failed to allocate {bytes} bytes for frame buffers")]
    AllocationFailed {
        /// Size of the failed request.
        bytes: usize,
    },
}

impl Vp8Error {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Vp8Error::CorruptFrame {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(feature: impl Into<String>) -> Self {
        Vp8Error::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Returns true if decoding can continue with the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Vp8Error::CorruptFrame { .. })
    }

    /// Returns true if the caller should request a fresh keyframe.
    pub fn requires_keyframe(&self) -> bool {
        matches!(
            self,
            Vp8Error::CorruptKeyframe { .. }
                | Vp8Error::MissingKeyframe
                | Vp8Error::UnsupportedFeature { .. }
                | Vp8Error::InvalidDimensions { .. }
                | Vp8Error::DimensionsTooLarge { .. }
                | Vp8Error::AllocationFailed { .. }
        )
    }
}

/// VP8 result type.
pub type Result<T> = std::result::Result<T, Vp8Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classification() {
        assert!(Vp8Error::corrupt("x").is_recoverable());
        assert!(!Vp8Error::corrupt("x").requires_keyframe());
        assert!(Vp8Error::MissingKeyframe.requires_keyframe());
        assert!(Vp8Error::unsupported("version 5").requires_keyframe());
        assert!(!Vp8Error::InvalidParameter { reason: "w".into() }.requires_keyframe());
    }

    #[test]
    fn test_display() {
        let err = Vp8Error::DimensionsTooLarge {
            width: 8192,
            height: 64,
            max_width: 4096,
            max_height: 4096,
        };
        assert_eq!(
            err.to_string(),
            "Dimensions 8192x64 exceed maximum 4096x4096"
        );
    }
}
