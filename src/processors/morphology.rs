//! Stroke thickening with a 2×2 structuring element.
//!
//! The kernel is anchored at its bottom-right cell, so each output pixel is the
//! maximum of itself and its left, upper and upper-left neighbours. Pixels
//! outside the image do not contribute. `imageproc::morphology` only offers
//! odd, norm-shaped kernels, hence the dedicated implementation.

use image::{GrayImage, Luma};
use ndarray::Array2;

/// Dilates an 8-bit image with a 2×2 kernel for `iterations` passes.
pub fn dilate_2x2(image: &GrayImage, iterations: usize) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut current = image.clone();
    for _ in 0..iterations {
        let source = current;
        current = GrayImage::from_fn(width, height, |x, y| {
            let mut value = source.get_pixel(x, y)[0];
            if x > 0 {
                value = value.max(source.get_pixel(x - 1, y)[0]);
            }
            if y > 0 {
                value = value.max(source.get_pixel(x, y - 1)[0]);
                if x > 0 {
                    value = value.max(source.get_pixel(x - 1, y - 1)[0]);
                }
            }
            Luma([value])
        });
    }
    current
}

/// Dilates a floating point plane with the same 2×2 kernel as [`dilate_2x2`].
pub fn dilate_2x2_plane(plane: &Array2<f32>, iterations: usize) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    let mut current = plane.clone();
    for _ in 0..iterations {
        let source = current;
        current = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let mut value = source[[r, c]];
            if c > 0 {
                value = value.max(source[[r, c - 1]]);
            }
            if r > 0 {
                value = value.max(source[[r - 1, c]]);
                if c > 0 {
                    value = value.max(source[[r - 1, c - 1]]);
                }
            }
            value
        });
    }
    current
}
