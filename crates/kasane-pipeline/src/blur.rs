//! Gaussian blur over RGBA frames.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which only accepts a
//! single-channel image: the frame is split into its four channels, each
//! is blurred independently, and the result is reassembled. Gaussian
//! blur is a linear per-channel operation, so this is equivalent to
//! blurring in color space.

use image::GrayImage;

use crate::types::Frame;

/// Apply Gaussian blur to an RGBA frame.
///
/// Non-positive sigma values return a copy of the input unchanged, since
/// the underlying `imageproc` function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred frame"]
pub fn gaussian_blur_rgba(frame: &Frame, sigma: f32) -> Frame {
    if sigma <= 0.0 {
        return frame.clone();
    }

    let (w, h) = (frame.width(), frame.height());

    let channels: [GrayImage; 4] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([frame.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 4] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    Frame::from_fn(w, h, |x, y| {
        image::Rgba([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
            blurred[3].get_pixel(x, y).0[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame with a sharp black-to-white vertical boundary at x=5.
    fn sharp_edge_frame() -> Frame {
        Frame::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn zero_sigma_returns_identical_frame() {
        let frame = sharp_edge_frame();
        assert_eq!(gaussian_blur_rgba(&frame, 0.0), frame);
    }

    #[test]
    fn negative_sigma_returns_identical_frame() {
        let frame = sharp_edge_frame();
        assert_eq!(gaussian_blur_rgba(&frame, -1.0), frame);
    }

    #[test]
    fn blur_softens_a_sharp_edge() {
        let frame = sharp_edge_frame();
        let blurred = gaussian_blur_rgba(&frame, 2.0);
        // Pixels adjacent to the boundary move off their extremes.
        let near_edge = blurred.get_pixel(4, 5).0[0];
        assert!(
            near_edge > 0,
            "expected boundary pixel to brighten, got {near_edge}"
        );
        assert_eq!(blurred.dimensions(), frame.dimensions());
    }

    #[test]
    fn blur_preserves_uniform_alpha() {
        let frame = sharp_edge_frame();
        let blurred = gaussian_blur_rgba(&frame, 3.0);
        for p in blurred.pixels() {
            assert_eq!(p.0[3], 255);
        }
    }
}
