//! Stage kinds: the closed set of filter operations a chain can hold.
//!
//! Each kind pairs a filter function with a concrete params type. The
//! enum replaces per-filter subclassing: adding a kind means adding a
//! variant here, a params variant in [`crate::params`], and a registry
//! entry in [`crate::registry`].

use std::fmt;

use crate::params::StageParams;
use crate::types::{Frame, StageError};

/// Identifies one filter operation.
///
/// [`Source`](Self::Source) is special: it is the designated root-stage
/// kind, holds the loaded image rather than transforming an upstream
/// frame, and is the only kind legal at position 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Root: the user-loaded source image.
    Source,
    /// Grayscale conversion.
    Grayscale,
    /// Channel inversion.
    Invert,
    /// Gaussian blur.
    Blur,
    /// Binary threshold.
    Threshold,
    /// Uniform-scale resize.
    Resize,
}

impl StageKind {
    /// The persisted discriminator for this kind (the `tabName` field of
    /// pipeline files).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Grayscale => "grayscale",
            Self::Invert => "invert",
            Self::Blur => "blur",
            Self::Threshold => "threshold",
            Self::Resize => "resize",
        }
    }

    /// Default params for this kind.
    #[must_use]
    pub fn default_params(self) -> StageParams {
        match self {
            Self::Source => StageParams::Source(crate::params::SourceParams::default()),
            Self::Grayscale => StageParams::Grayscale(crate::params::GrayscaleParams::default()),
            Self::Invert => StageParams::Invert(crate::params::InvertParams::default()),
            Self::Blur => StageParams::Blur(crate::params::BlurParams::default()),
            Self::Threshold => StageParams::Threshold(crate::params::ThresholdParams::default()),
            Self::Resize => StageParams::Resize(crate::params::ResizeParams::default()),
        }
    }

    /// Whether `params` is the variant this kind expects.
    #[must_use]
    pub fn accepts(self, params: &StageParams) -> bool {
        self.name() == params.variant_name()
    }

    /// Apply this kind's filter to an input frame.
    ///
    /// The engine treats the filter as an opaque fallible
    /// `Frame -> Frame` function; the input is never mutated.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::ParamsMismatch`] when `params` is not the
    /// variant this kind expects, and [`StageError::Filter`] when the
    /// wrapped operation fails. `Source` never transforms an upstream
    /// frame; asking it to is a params mismatch by construction.
    pub fn apply(self, input: &Frame, params: &StageParams) -> Result<Frame, StageError> {
        match (self, params) {
            (Self::Grayscale, StageParams::Grayscale(_)) => Ok(crate::tone::grayscale(input)),
            (Self::Invert, StageParams::Invert(_)) => Ok(crate::tone::invert(input)),
            (Self::Blur, StageParams::Blur(p)) => Ok(crate::blur::gaussian_blur_rgba(input, p.sigma)),
            (Self::Threshold, StageParams::Threshold(p)) => {
                Ok(crate::threshold::binary_threshold(input, p.threshold))
            }
            (Self::Resize, StageParams::Resize(p)) => crate::resize::scale(input, p.scale, p.filter),
            (kind, params) => Err(StageError::ParamsMismatch {
                expected: kind.name(),
                got: params.variant_name(),
            }),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::{BlurParams, ThresholdParams};

    #[test]
    fn names_are_stable() {
        assert_eq!(StageKind::Source.name(), "source");
        assert_eq!(StageKind::Blur.name(), "blur");
        assert_eq!(StageKind::Threshold.name(), "threshold");
    }

    #[test]
    fn default_params_match_kind() {
        for kind in [
            StageKind::Source,
            StageKind::Grayscale,
            StageKind::Invert,
            StageKind::Blur,
            StageKind::Threshold,
            StageKind::Resize,
        ] {
            assert!(kind.accepts(&kind.default_params()), "{kind}");
        }
    }

    #[test]
    fn apply_with_matching_params() {
        let frame = Frame::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let out = StageKind::Blur
            .apply(&frame, &StageParams::Blur(BlurParams { sigma: 1.0 }))
            .unwrap();
        assert_eq!(out.dimensions(), frame.dimensions());
    }

    #[test]
    fn apply_with_wrong_params_is_a_mismatch() {
        let frame = Frame::new(2, 2);
        let err = StageKind::Blur
            .apply(
                &frame,
                &StageParams::Threshold(ThresholdParams::default()),
            )
            .unwrap_err();
        assert_eq!(
            err,
            StageError::ParamsMismatch {
                expected: "blur",
                got: "threshold",
            },
        );
    }

    #[test]
    fn source_never_applies() {
        let frame = Frame::new(2, 2);
        let err = StageKind::Source
            .apply(&frame, &StageKind::Source.default_params())
            .unwrap_err();
        assert!(matches!(err, StageError::ParamsMismatch { .. }));
    }
}
