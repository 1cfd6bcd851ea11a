//! Binary threshold over RGBA frames.
//!
//! The frame is reduced to luma, cut at a fixed threshold, and expanded
//! back to RGBA (alpha forced opaque) so every stage in the chain
//! consumes and produces the same frame type.

use crate::types::Frame;

/// Binarize a frame: luma at or above `threshold` becomes white,
/// everything below becomes black.
#[must_use = "returns the thresholded frame"]
pub fn binary_threshold(frame: &Frame, threshold: u8) -> Frame {
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b, _] = frame.get_pixel(x, y).0;
        let v = if luma(r, g, b) >= threshold { 255 } else { 0 };
        image::Rgba([v, v, v, 255])
    })
}

/// ITU-R BT.601 luma, matching the `image` crate's grayscale weights.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299f32.mul_add(f32::from(r), 0.587f32.mul_add(f32::from(g), 0.114 * f32::from(b)));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        y.round().clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_black_and_white() {
        let frame = Frame::from_fn(4, 1, |x, _| {
            let v = [0u8, 100, 150, 255][x as usize];
            image::Rgba([v, v, v, 255])
        });
        let out = binary_threshold(&frame, 128);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(2, 0).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(3, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn threshold_zero_is_all_white() {
        let frame = Frame::from_pixel(3, 3, image::Rgba([7, 7, 7, 255]));
        let out = binary_threshold(&frame, 0);
        for p in out.pixels() {
            assert_eq!(p.0, [255, 255, 255, 255]);
        }
    }

    #[test]
    fn exact_threshold_value_is_white() {
        let frame = Frame::from_pixel(1, 1, image::Rgba([128, 128, 128, 255]));
        let out = binary_threshold(&frame, 128);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn luma_weights_green_heaviest() {
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
        assert!(luma(255, 0, 0) > luma(0, 0, 255));
    }
}
