//! Global Otsu binarisation with inverted polarity.
//!
//! Handwriting arrives as dark ink on a light background; the classifier
//! expects bright strokes on black. Pixels at or below the Otsu level become
//! foreground (255), everything brighter becomes background (0).

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Value written for foreground (ink) pixels.
pub const FOREGROUND: u8 = 255;
/// Value written for background pixels.
pub const BACKGROUND: u8 = 0;

/// Result of an inverted Otsu binarisation.
#[derive(Debug, Clone)]
pub struct Binarized {
    /// The binary image, ink = [`FOREGROUND`].
    pub image: GrayImage,
    /// The automatically selected threshold.
    pub level: u8,
}

/// Binarises `image` with an automatically chosen threshold and inverted polarity.
pub fn otsu_inverted(image: &GrayImage) -> Binarized {
    let level = otsu_level(image);
    Binarized {
        image: threshold_inverted(image, level),
        level,
    }
}

/// Maps pixels `<= level` to [`FOREGROUND`] and the rest to [`BACKGROUND`].
pub fn threshold_inverted(image: &GrayImage, level: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Whether every pixel of `image` has the same value.
///
/// Such an image carries no ink/background separation and cannot be
/// meaningfully thresholded.
pub fn is_uniform(image: &GrayImage) -> bool {
    let mut pixels = image.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p[0] == first[0]),
        None => true,
    }
}

/// Mean intensity of the pixels classified as background by `level`.
///
/// Falls back to white when no pixel lies above the threshold.
pub fn background_level(image: &GrayImage, level: u8) -> u8 {
    let (sum, count) = image
        .pixels()
        .filter(|p| p[0] > level)
        .fold((0u64, 0u64), |(sum, count), p| (sum + p[0] as u64, count + 1));
    if count == 0 {
        u8::MAX
    } else {
        (sum / count) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ink_on_paper() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            if (8..12).contains(&x) && (3..17).contains(&y) {
                Luma([30])
            } else {
                Luma([220])
            }
        })
    }

    #[test]
    fn test_otsu_inverts_polarity() {
        let result = otsu_inverted(&ink_on_paper());
        assert!(result.level >= 30 && result.level < 220);
        assert_eq!(result.image.get_pixel(9, 10)[0], FOREGROUND);
        assert_eq!(result.image.get_pixel(0, 0)[0], BACKGROUND);
    }

    #[test]
    fn test_output_is_binary() {
        let image = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 8 + y * 5) % 256) as u8]));
        let result = otsu_inverted(&image);
        assert!(result
            .image
            .pixels()
            .all(|p| p[0] == FOREGROUND || p[0] == BACKGROUND));
    }

    #[test]
    fn test_is_uniform() {
        assert!(is_uniform(&GrayImage::from_pixel(5, 5, Luma([0]))));
        assert!(is_uniform(&GrayImage::new(0, 0)));
        assert!(!is_uniform(&ink_on_paper()));
    }

    #[test]
    fn test_background_level() {
        let image = ink_on_paper();
        assert_eq!(background_level(&image, 100), 220);
        assert_eq!(background_level(&GrayImage::from_pixel(4, 4, Luma([10])), 100), 255);
    }
}
