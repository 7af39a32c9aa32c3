//! Area-averaging resize.
//!
//! Each destination pixel is the coverage-weighted mean of the source pixels
//! its footprint overlaps. When shrinking this is a box filter without the
//! aliasing of nearest/linear sampling; when enlarging it degrades gracefully
//! to a blend of at most two neighbours per axis. `image::imageops` has no
//! area filter, so the weights are computed here and applied separably.

use crate::core::errors::DigitError;
use image::{GrayImage, Luma};

/// One source contribution: source index and its normalised weight.
type Tap = (usize, f32);

fn axis_taps(src: u32, dst: u32) -> Vec<Vec<Tap>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src as usize);
            let mut taps: Vec<Tap> = (first..last)
                .filter_map(|s| {
                    let overlap = (end.min(s as f64 + 1.0) - start.max(s as f64)).max(0.0);
                    (overlap > 0.0).then_some((s, overlap as f32))
                })
                .collect();
            let total: f32 = taps.iter().map(|(_, w)| w).sum();
            if total > 0.0 {
                for tap in &mut taps {
                    tap.1 /= total;
                }
            }
            taps
        })
        .collect()
}

/// Resizes `image` to `width`×`height` using area averaging.
///
/// # Errors
///
/// Returns `DigitError::InvalidInput` if either the source or target size is zero.
pub fn resize_area(image: &GrayImage, width: u32, height: u32) -> Result<GrayImage, DigitError> {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return Err(DigitError::invalid_input(format!(
            "cannot area-resize {src_w}x{src_h} to {width}x{height}"
        )));
    }
    if (src_w, src_h) == (width, height) {
        return Ok(image.clone());
    }

    let x_taps = axis_taps(src_w, width);
    let y_taps = axis_taps(src_h, height);

    // Horizontal pass into a float buffer of src_h rows × width columns.
    let mut rows = vec![0f32; src_h as usize * width as usize];
    for y in 0..src_h {
        for (dx, taps) in x_taps.iter().enumerate() {
            rows[y as usize * width as usize + dx] = taps
                .iter()
                .map(|&(sx, w)| image.get_pixel(sx as u32, y)[0] as f32 * w)
                .sum();
        }
    }

    let mut output = GrayImage::new(width, height);
    for (dy, taps) in y_taps.iter().enumerate() {
        for dx in 0..width as usize {
            let value: f32 = taps
                .iter()
                .map(|&(sy, w)| rows[sy * width as usize + dx] * w)
                .sum();
            output.put_pixel(
                dx as u32,
                dy as u32,
                Luma([value.round().clamp(0.0, 255.0) as u8]),
            );
        }
    }
    Ok(output)
}
