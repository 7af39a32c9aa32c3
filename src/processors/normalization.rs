//! Canonicalisation of raw digit crops.
//!
//! [`DigitNormalizer`] turns an arbitrary grayscale crop (dark ink on light
//! paper) into a [`CanonicalDigit`]: a 28×28 plane in `[0, 1]` with bright
//! strokes on a zero background, tightly cropped, centred on a square canvas
//! and area-resampled. The steps are
//!
//! 1. CLAHE (clip 2.0, 8×8 tiles) to even out lighting and pen pressure
//! 2. inverted Otsu binarisation
//! 3. 3×3 median filter against binarisation speckle
//! 4. one 2×2 dilation pass to thicken thin strokes
//! 5. outer contour detection; the union of their bounding boxes is the crop
//! 6. centring on a zero-filled square canvas
//! 7. area resize to 28×28
//! 8. scaling to `[0, 1]`
//!
//! Normalisation never fails outward. Inputs without foreground, and any
//! internal error, yield the all-zero canonical digit.

use crate::core::errors::{DigitError, SimpleError};
use crate::processors::binarize::{self, BACKGROUND};
use crate::processors::clahe::Clahe;
use crate::processors::morphology::dilate_2x2;
use crate::processors::resize::resize_area;
use crate::utils::image::encode_png;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::filter::median_filter;
use ndarray::Array2;
use tracing::{debug, warn};

/// Side length of a canonical digit.
pub const CANONICAL_SIZE: usize = 28;

/// A 28×28 single-channel digit with values in `[0, 1]`, ink bright.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDigit {
    plane: Array2<f32>,
}

impl CanonicalDigit {
    /// The all-zero digit used when no foreground is found.
    pub fn blank() -> Self {
        Self {
            plane: Array2::zeros((CANONICAL_SIZE, CANONICAL_SIZE)),
        }
    }

    /// Wraps an existing plane.
    ///
    /// # Errors
    ///
    /// Returns `DigitError::InvalidInput` if the plane is not 28×28 or holds
    /// values outside `[0, 1]`.
    pub fn from_plane(plane: Array2<f32>) -> Result<Self, DigitError> {
        if plane.dim() != (CANONICAL_SIZE, CANONICAL_SIZE) {
            return Err(DigitError::invalid_input(format!(
                "canonical digit must be {CANONICAL_SIZE}x{CANONICAL_SIZE}, got {:?}",
                plane.dim()
            )));
        }
        if plane.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(DigitError::invalid_input(
                "canonical digit values must lie in [0, 1]",
            ));
        }
        Ok(Self { plane })
    }

    /// Builds a canonical digit from a 28×28 8-bit image (ink bright).
    pub fn from_gray(image: &GrayImage) -> Result<Self, DigitError> {
        let (width, height) = image.dimensions();
        if (width as usize, height as usize) != (CANONICAL_SIZE, CANONICAL_SIZE) {
            return Err(DigitError::invalid_input(format!(
                "canonical digit must be {CANONICAL_SIZE}x{CANONICAL_SIZE}, got {width}x{height}"
            )));
        }
        let plane = Array2::from_shape_fn((CANONICAL_SIZE, CANONICAL_SIZE), |(r, c)| {
            image.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
        });
        Ok(Self { plane })
    }

    /// The underlying `[row, column]` plane.
    pub fn as_array(&self) -> &Array2<f32> {
        &self.plane
    }

    /// Consumes the digit, returning its plane.
    pub fn into_array(self) -> Array2<f32> {
        self.plane
    }

    /// Whether every value is zero.
    pub fn is_blank(&self) -> bool {
        self.plane.iter().all(|&v| v == 0.0)
    }

    /// Renders the digit as an 8-bit image, ink bright.
    pub fn to_gray_image(&self) -> GrayImage {
        plane_to_gray(&self.plane)
    }

    /// Renders the digit the way raw input arrives: dark ink on light paper.
    pub fn to_raw_image(&self) -> GrayImage {
        let mut image = self.to_gray_image();
        image::imageops::invert(&mut image);
        image
    }
}

/// Converts a `[0, 1]` plane to an 8-bit image.
pub(crate) fn plane_to_gray(plane: &Array2<f32>) -> GrayImage {
    let (rows, cols) = plane.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = plane[[y as usize, x as usize]];
        Luma([(v * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Output of [`DigitNormalizer::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedDigit {
    /// The canonical digit handed to the classifier.
    pub digit: CanonicalDigit,
    /// PNG encoding of the canonical digit, for display only.
    pub preview_png: Vec<u8>,
    /// Set when the blank fallback was produced.
    pub is_fallback: bool,
}

/// Converts raw grayscale crops into canonical digits.
#[derive(Debug, Clone)]
pub struct DigitNormalizer {
    clahe: Clahe,
    median_radius: u32,
    dilate_iterations: usize,
}

impl Default for DigitNormalizer {
    fn default() -> Self {
        Self {
            clahe: Clahe::default(),
            median_radius: 1,
            dilate_iterations: 1,
        }
    }
}

impl DigitNormalizer {
    /// Creates a normalizer with the standard parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contrast enhancement operator.
    pub fn with_clahe(mut self, clahe: Clahe) -> Self {
        self.clahe = clahe;
        self
    }

    /// Normalises `raw`, falling back to the blank digit on any failure.
    pub fn normalize(&self, raw: &GrayImage) -> NormalizedDigit {
        let (digit, is_fallback) = match self.try_normalize(raw) {
            Ok(Some(digit)) => (digit, false),
            Ok(None) => {
                warn!(
                    width = raw.width(),
                    height = raw.height(),
                    "No foreground found, using blank digit"
                );
                (CanonicalDigit::blank(), true)
            }
            Err(err) => {
                warn!(error = %err, "Normalization failed, using blank digit");
                (CanonicalDigit::blank(), true)
            }
        };

        let preview_png = encode_png(&digit.to_gray_image()).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to encode preview");
            Vec::new()
        });

        NormalizedDigit {
            digit,
            preview_png,
            is_fallback,
        }
    }

    /// Runs the canonicalisation steps. `Ok(None)` means no foreground.
    pub fn try_normalize(&self, raw: &GrayImage) -> Result<Option<CanonicalDigit>, DigitError> {
        let (width, height) = raw.dimensions();
        if width == 0 || height == 0 || binarize::is_uniform(raw) {
            return Ok(None);
        }

        let enhanced = self.clahe.apply(raw);
        let binary = binarize::otsu_inverted(&enhanced);
        let denoised = median_filter(&binary.image, self.median_radius, self.median_radius);
        let thick = dilate_2x2(&denoised, self.dilate_iterations);

        let Some((x, y, w, h)) = foreground_bounds(&thick) else {
            return Ok(None);
        };
        debug!(level = binary.level, x, y, w, h, "Foreground bounds");

        let crop = image::imageops::crop_imm(&thick, x, y, w, h).to_image();
        let square = pad_to_square(&crop);
        let resized = resize_area(&square, CANONICAL_SIZE as u32, CANONICAL_SIZE as u32)
            .map_err(|e| DigitError::resize("resize to canonical size", e))?;

        let digit = CanonicalDigit::from_gray(&resized)?;
        if digit.is_blank() {
            return Err(DigitError::normalization(
                "canonical digit",
                SimpleError::new("resampling erased all foreground"),
            ));
        }
        Ok(Some(digit))
    }
}

/// Bounding box `(x, y, width, height)` enclosing every outer contour.
fn foreground_bounds(binary: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let contours = find_contours::<u32>(binary);
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
    {
        for point in &contour.points {
            bounds = Some(match bounds {
                None => (point.x, point.y, point.x, point.y),
                Some((x0, y0, x1, y1)) => (
                    x0.min(point.x),
                    y0.min(point.y),
                    x1.max(point.x),
                    y1.max(point.y),
                ),
            });
        }
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Centres `crop` on a zero-filled square canvas.
///
/// Offsets are truncated, so odd slack leaves the extra pixel on the
/// right/bottom.
pub fn pad_to_square(crop: &GrayImage) -> GrayImage {
    let (w, h) = crop.dimensions();
    let size = w.max(h);
    let mut canvas = GrayImage::from_pixel(size, size, Luma([BACKGROUND]));
    let dx = (size - w) / 2;
    let dy = (size - h) / 2;
    image::imageops::replace(&mut canvas, crop, dx as i64, dy as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A dark vertical bar with a foot on light paper.
    fn raw_bar(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let in_bar = x >= width / 2 - 2 && x < width / 2 + 2 && y >= 6 && y < height - 6;
            let in_foot = y >= height - 10 && y < height - 6 && x >= width / 2 - 6 && x < width / 2 + 6;
            if in_bar || in_foot {
                Luma([25])
            } else {
                Luma([235])
            }
        })
    }

    #[test]
    fn test_output_shape_and_range() {
        let result = DigitNormalizer::new().normalize(&raw_bar(60, 80));
        assert!(!result.is_fallback);
        let plane = result.digit.as_array();
        assert_eq!(plane.dim(), (28, 28));
        assert!(plane.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(plane.iter().any(|&v| v > 0.5));
        assert!(!result.preview_png.is_empty());
    }

    #[test]
    fn test_blank_inputs_fall_back() {
        for value in [0u8, 255u8] {
            let raw = GrayImage::from_pixel(50, 50, Luma([value]));
            let result = DigitNormalizer::new().normalize(&raw);
            assert!(result.is_fallback);
            assert!(result.digit.is_blank());
            assert!(!result.preview_png.is_empty());
        }
    }

    #[test]
    fn test_empty_image_falls_back() {
        let result = DigitNormalizer::new().normalize(&GrayImage::new(0, 0));
        assert!(result.is_fallback);
        assert!(result.digit.is_blank());
    }

    #[test]
    fn test_ink_is_bright_and_border_dark() {
        let result = DigitNormalizer::new().normalize(&raw_bar(60, 80));
        let plane = result.digit.as_array();
        // Tall bar: the crop is taller than wide, so the left and right
        // columns of the canonical digit are padding.
        assert!(plane.column(0).iter().all(|&v| v == 0.0));
        assert!(plane.column(27).iter().all(|&v| v == 0.0));
        assert!(plane[[14, 14]] > 0.5);
    }

    #[test]
    fn test_deterministic() {
        let normalizer = DigitNormalizer::new();
        let raw = raw_bar(45, 70);
        assert_eq!(normalizer.normalize(&raw).digit, normalizer.normalize(&raw).digit);
    }

    #[test]
    fn test_pad_to_square_centres_with_truncation() {
        let crop = GrayImage::from_pixel(3, 8, Luma([255]));
        let square = pad_to_square(&crop);
        assert_eq!(square.dimensions(), (8, 8));
        // slack 5 -> 2 on the left, 3 on the right
        assert_eq!(square.get_pixel(1, 0)[0], 0);
        assert_eq!(square.get_pixel(2, 0)[0], 255);
        assert_eq!(square.get_pixel(4, 7)[0], 255);
        assert_eq!(square.get_pixel(5, 7)[0], 0);
    }

    #[test]
    fn test_canonical_digit_validation() {
        assert!(CanonicalDigit::from_plane(Array2::zeros((27, 28))).is_err());
        assert!(CanonicalDigit::from_plane(Array2::from_elem((28, 28), 1.5)).is_err());
        assert!(CanonicalDigit::from_plane(Array2::from_elem((28, 28), 0.25)).is_ok());
    }

    #[test]
    fn test_raw_rendering_round_trip() {
        let digit = DigitNormalizer::new().normalize(&raw_bar(60, 80)).digit;
        let raw = digit.to_raw_image();
        assert_eq!(raw.get_pixel(0, 0)[0], 255);
        let again = DigitNormalizer::new().normalize(&raw);
        assert!(!again.is_fallback);
        let overlap: f32 = digit
            .as_array()
            .iter()
            .zip(again.digit.as_array().iter())
            .map(|(a, b)| a.min(*b))
            .sum();
        let ink: f32 = digit.as_array().sum();
        assert!(overlap / ink > 0.6);
    }
}
