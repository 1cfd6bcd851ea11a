//! Tone adjustments: grayscale conversion and channel inversion.

use crate::types::Frame;

/// Convert a frame to grayscale, keeping the RGBA layout (all three
/// color channels carry the luma value, alpha is preserved).
#[must_use = "returns the grayscale frame"]
pub fn grayscale(frame: &Frame) -> Frame {
    let luma = image::imageops::grayscale(frame);
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        let v = luma.get_pixel(x, y).0[0];
        let a = frame.get_pixel(x, y).0[3];
        image::Rgba([v, v, v, a])
    })
}

/// Invert the color channels of a frame, preserving alpha.
#[must_use = "returns the inverted frame"]
pub fn invert(frame: &Frame) -> Frame {
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b, a] = frame.get_pixel(x, y).0;
        image::Rgba([255 - r, 255 - g, 255 - b, a])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayscale_flattens_channels() {
        let frame = Frame::from_pixel(2, 2, image::Rgba([200, 50, 10, 255]));
        let gray = grayscale(&frame);
        let [r, g, b, a] = gray.get_pixel(0, 0).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 255);
    }

    #[test]
    fn grayscale_preserves_alpha() {
        let frame = Frame::from_pixel(1, 1, image::Rgba([10, 20, 30, 40]));
        assert_eq!(grayscale(&frame).get_pixel(0, 0).0[3], 40);
    }

    #[test]
    fn invert_flips_color_not_alpha() {
        let frame = Frame::from_pixel(1, 1, image::Rgba([0, 100, 255, 128]));
        let out = invert(&frame);
        assert_eq!(out.get_pixel(0, 0).0, [255, 155, 0, 128]);
    }

    #[test]
    fn invert_twice_is_identity() {
        let frame = Frame::from_fn(3, 3, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([x as u8, y as u8, (x * y) as u8, 255])
        });
        assert_eq!(invert(&invert(&frame)), frame);
    }
}
