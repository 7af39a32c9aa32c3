//! Deterministic test-time augmentation of canonical digits.
//!
//! The batch is the original digit followed by one-pixel shifts left, right,
//! up and down, a small rotation about the centre and one 2×2 dilation pass.
//! Shifts and rotation fill uncovered pixels with zero; nothing wraps.

use crate::core::batch::{stack_planes, Tensor4D};
use crate::core::errors::DigitError;
use crate::processors::morphology::dilate_2x2_plane;
use crate::processors::normalization::{plane_to_gray, CanonicalDigit, CANONICAL_SIZE};
use image::Luma;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use ndarray::Array2;

/// Shifts `plane` by `(dx, dy)` pixels, zero-filling the entering edge.
///
/// Positive `dx` moves content right, positive `dy` moves it down.
pub fn shift_plane(plane: &Array2<f32>, dx: i32, dy: i32) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let src_r = r as i64 - dy as i64;
        let src_c = c as i64 - dx as i64;
        if src_r < 0 || src_c < 0 || src_r >= rows as i64 || src_c >= cols as i64 {
            0.0
        } else {
            plane[[src_r as usize, src_c as usize]]
        }
    })
}

/// Rotates `plane` by `degrees` (clockwise on screen) about its centre.
///
/// Uses bilinear sampling on an 8-bit rendering; pixels mapped from outside
/// the source are zero.
pub fn rotate_plane(plane: &Array2<f32>, degrees: f32) -> Array2<f32> {
    let image = plane_to_gray(plane);
    let rotated = rotate_about_center(
        &image,
        degrees.to_radians(),
        Interpolation::Bilinear,
        Luma([0u8]),
    );
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        rotated.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
    })
}

/// Builds the augmentation batch for one digit.
#[derive(Debug, Clone)]
pub struct Augmenter {
    shifts: Vec<(i32, i32)>,
    rotation_degrees: f32,
    dilate_iterations: usize,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self {
            shifts: vec![(-1, 0), (1, 0), (0, -1), (0, 1)],
            rotation_degrees: 10.0,
            dilate_iterations: 1,
        }
    }
}

impl Augmenter {
    /// Creates the standard augmenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batch members produced per digit.
    pub fn batch_size(&self) -> usize {
        // original + shifts + rotation + dilation
        self.shifts.len() + 3
    }

    /// Produces `[batch_size, 1, 28, 28]` for `digit`, original first.
    ///
    /// # Errors
    ///
    /// Returns an augmentation error if the digit plane has an unexpected
    /// shape or the members cannot be stacked.
    pub fn build_batch(&self, digit: &CanonicalDigit) -> Result<Tensor4D, DigitError> {
        let plane = digit.as_array();
        if plane.dim() != (CANONICAL_SIZE, CANONICAL_SIZE) {
            return Err(DigitError::augmentation(
                "input plane",
                crate::core::errors::SimpleError::new(format!(
                    "expected {CANONICAL_SIZE}x{CANONICAL_SIZE}, got {:?}",
                    plane.dim()
                )),
            ));
        }

        let mut members = Vec::with_capacity(self.batch_size());
        members.push(plane.clone());
        members.extend(self.shifts.iter().map(|&(dx, dy)| shift_plane(plane, dx, dy)));
        members.push(rotate_plane(plane, self.rotation_degrees));
        members.push(dilate_2x2_plane(plane, self.dilate_iterations));

        stack_planes(&members).map_err(|e| DigitError::augmentation("stack batch", e))
    }
}
