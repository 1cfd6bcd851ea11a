//! Uniform-scale resize.

use crate::params::ResizeFilter;
use crate::types::{Frame, StageError};

/// Resize a frame by a uniform scale factor.
///
/// # Errors
///
/// Returns [`StageError::Filter`] when the scaled dimensions collapse to
/// zero pixels on either axis, a degenerate geometry the engine treats
/// as a per-stage failure rather than a panic.
pub fn scale(frame: &Frame, factor: f32, filter: ResizeFilter) -> Result<Frame, StageError> {
    let w = scaled_dimension(frame.width(), factor);
    let h = scaled_dimension(frame.height(), factor);
    if w == 0 || h == 0 {
        return Err(StageError::Filter {
            message: format!(
                "scale {factor} collapses {}x{} to {w}x{h}",
                frame.width(),
                frame.height(),
            ),
        });
    }
    Ok(image::imageops::resize(
        frame,
        w,
        h,
        filter.to_image_filter(),
    ))
}

fn scaled_dimension(dim: u32, factor: f32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ((f64::from(dim) * f64::from(factor)).round().max(0.0)) as u32
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn halves_dimensions() {
        let frame = Frame::new(10, 6);
        let out = scale(&frame, 0.5, ResizeFilter::Nearest).unwrap();
        assert_eq!(out.dimensions(), (5, 3));
    }

    #[test]
    fn upscale_doubles_dimensions() {
        let frame = Frame::new(4, 4);
        let out = scale(&frame, 2.0, ResizeFilter::Triangle).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn collapse_to_zero_is_a_filter_error() {
        let frame = Frame::new(2, 2);
        let result = scale(&frame, 0.01, ResizeFilter::Nearest);
        assert!(matches!(result, Err(StageError::Filter { .. })));
    }

    #[test]
    fn identity_scale_preserves_pixels() {
        let frame = Frame::from_pixel(3, 3, image::Rgba([9, 8, 7, 255]));
        let out = scale(&frame, 1.0, ResizeFilter::Nearest).unwrap();
        assert_eq!(out, frame);
    }
}
