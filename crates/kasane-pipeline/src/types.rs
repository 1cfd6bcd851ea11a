//! Shared types for the kasane stage chain engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` as the working raster type so downstream crates
/// can reference frames without depending on `image` directly.
pub use image::RgbaImage as Frame;

/// A frame shared between a stage's cache slot and its consumers.
///
/// Frames are immutable once cached: filters take `&Frame` and produce a
/// new `Frame`, so a cached frame can never be mutated out from under a
/// stage that still references it as its upstream input.
pub type SharedFrame = Arc<Frame>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a frame.
    #[must_use]
    pub fn of(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
        }
    }
}

/// A failure local to one stage evaluation.
///
/// Stored in the failing stage's error slot, handed to the
/// [`ErrorSink`](crate::sink::ErrorSink), and returned to the caller of
/// [`Chain::image_at`](crate::chain::Chain::image_at). Cloneable so the
/// same error can live in all three places; the decode variant carries
/// the underlying `image::ImageError` as a string for that reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// The root image bytes could not be decoded.
    #[error("failed to decode root image: {0}")]
    Decode(String),

    /// The root stage has no image loaded.
    #[error("no root image loaded")]
    EmptyInput,

    /// The wrapped filter call failed for this (frame, params) pair.
    #[error("filter failed: {message}")]
    Filter {
        /// Human-readable description of the failure.
        message: String,
    },

    /// This stage could not obtain an input frame because an earlier
    /// stage failed. Recorded per stage, distinct from the upstream
    /// stage's own error.
    #[error("upstream stage output unavailable")]
    UpstreamUnavailable,

    /// A stage was handed params of the wrong variant for its kind.
    #[error("params mismatch: stage kind {expected} got {got} params")]
    ParamsMismatch {
        /// Discriminator of the stage's kind.
        expected: &'static str,
        /// Discriminator of the params variant actually supplied.
        got: &'static str,
    },

    /// A params value was outside its valid domain and could not be
    /// clamped at the boundary.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl From<image::ImageError> for StageError {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e.to_string())
    }
}
