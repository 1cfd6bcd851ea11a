//! Per-stage tunable parameters.
//!
//! One plain serde value struct per stage kind. Every numeric field has
//! a statically known valid range; [`clamped`](StageParams::clamped) is
//! applied at the boundary (host setters and codec deserialization) so
//! out-of-range values never reach the recompute path.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Minimum Gaussian blur sigma. Values at or below zero are treated as
/// "no blur" by the filter, so the boundary clamps to this floor.
pub const MIN_BLUR_SIGMA: f32 = 0.0;
/// Maximum Gaussian blur sigma exposed to the UI slider.
pub const MAX_BLUR_SIGMA: f32 = 25.0;
/// Minimum resize scale factor.
pub const MIN_RESIZE_SCALE: f32 = 0.05;
/// Maximum resize scale factor.
pub const MAX_RESIZE_SCALE: f32 = 4.0;

/// Params for the root stage: where the source image came from.
///
/// The path is a hint for persistence (written relative to the pipeline
/// file's directory); the root stage itself works on loaded bytes, not
/// on the path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParams {
    /// Location of the source image file.
    pub path: PathBuf,
}

/// Params for the grayscale conversion stage (no knobs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrayscaleParams {}

/// Params for the channel-inversion stage (no knobs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertParams {}

/// Params for the Gaussian blur stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    /// Blur kernel sigma. Higher values produce more smoothing.
    pub sigma: f32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self { sigma: 1.4 }
    }
}

/// Params for the binary threshold stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParams {
    /// Luma cutoff: pixels at or above become white, below become black.
    pub threshold: u8,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self { threshold: 128 }
    }
}

/// Resampling filter used by the resize stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    #[default]
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl ResizeFilter {
    /// The `image` crate filter this selection maps to.
    #[must_use]
    pub const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Params for the uniform-scale resize stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeParams {
    /// Uniform scale factor applied to both axes.
    pub scale: f32,
    /// Resampling filter.
    #[serde(default)]
    pub filter: ResizeFilter,
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self {
            scale: 0.5,
            filter: ResizeFilter::default(),
        }
    }
}

/// The tagged sum of all per-stage params.
///
/// Each stage owns exactly one variant, matching its
/// [`StageKind`](crate::kind::StageKind). The pairing is checked at
/// construction and whenever params are replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageParams {
    /// Root stage params.
    Source(SourceParams),
    /// Grayscale stage params.
    Grayscale(GrayscaleParams),
    /// Invert stage params.
    Invert(InvertParams),
    /// Blur stage params.
    Blur(BlurParams),
    /// Threshold stage params.
    Threshold(ThresholdParams),
    /// Resize stage params.
    Resize(ResizeParams),
}

impl StageParams {
    /// Discriminator of the variant, matching stage-kind names.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Grayscale(_) => "grayscale",
            Self::Invert(_) => "invert",
            Self::Blur(_) => "blur",
            Self::Threshold(_) => "threshold",
            Self::Resize(_) => "resize",
        }
    }

    /// Return a copy with every numeric field clamped into its valid
    /// range. Applied at the boundary; the recompute path assumes
    /// already-valid params.
    #[must_use]
    pub fn clamped(self) -> Self {
        match self {
            Self::Blur(p) => Self::Blur(BlurParams {
                sigma: p.sigma.clamp(MIN_BLUR_SIGMA, MAX_BLUR_SIGMA),
            }),
            Self::Resize(p) => Self::Resize(ResizeParams {
                scale: p.scale.clamp(MIN_RESIZE_SCALE, MAX_RESIZE_SCALE),
                filter: p.filter,
            }),
            // u8 threshold and the no-knob variants are valid by type.
            other => other,
        }
    }
}
