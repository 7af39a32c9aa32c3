//! Contrast limited adaptive histogram equalisation (CLAHE).
//!
//! The image is divided into a grid of tiles. Each tile gets its own
//! equalisation lookup table built from a clipped histogram, and every output
//! pixel is bilinearly interpolated between the tables of the four nearest
//! tile centres. Clipping bounds how strongly flat regions (paper texture,
//! uneven pen pressure) can be amplified.

use crate::core::errors::DigitError;
use image::GrayImage;

const BINS: usize = 256;

/// CLAHE operator for 8-bit grayscale images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    clip_limit: f32,
    tiles_x: u32,
    tiles_y: u32,
}

impl Default for Clahe {
    /// Clip limit 2.0 over an 8×8 tile grid.
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

impl Clahe {
    /// Creates an operator with the given clip limit and tile grid.
    ///
    /// A clip limit of `0.0` disables clipping (plain per-tile equalisation).
    ///
    /// # Errors
    ///
    /// Returns `DigitError::ConfigError` for a negative or non-finite clip
    /// limit or an empty tile grid.
    pub fn new(clip_limit: f32, tiles_x: u32, tiles_y: u32) -> Result<Self, DigitError> {
        if !clip_limit.is_finite() || clip_limit < 0.0 {
            return Err(DigitError::config_error_with_context(
                "clip_limit",
                &clip_limit.to_string(),
                "must be a finite, non-negative number",
            ));
        }
        if tiles_x == 0 || tiles_y == 0 {
            return Err(DigitError::config_error(
                "CLAHE tile grid must have at least one tile per axis",
            ));
        }
        Ok(Self {
            clip_limit,
            tiles_x,
            tiles_y,
        })
    }

    /// Applies the operator, returning a new image of the same size.
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }

        // Tiles never get narrower than one pixel on small crops.
        let grid_x = self.tiles_x.min(width);
        let grid_y = self.tiles_y.min(height);
        let tile_w = width.div_ceil(grid_x);
        let tile_h = height.div_ceil(grid_y);
        let nx = width.div_ceil(tile_w) as usize;
        let ny = height.div_ceil(tile_h) as usize;

        let mut luts = Vec::with_capacity(nx * ny);
        for ty in 0..ny {
            for tx in 0..nx {
                let x0 = tx as u32 * tile_w;
                let y0 = ty as u32 * tile_h;
                let x1 = (x0 + tile_w).min(width);
                let y1 = (y0 + tile_h).min(height);
                luts.push(self.tile_lut(image, x0, y0, x1, y1));
            }
        }

        let mut output = GrayImage::new(width, height);
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let value = image.get_pixel(x, y)[0] as usize;

            let (tx1, tx2, xa) = neighbours(x, tile_w, nx);
            let (ty1, ty2, ya) = neighbours(y, tile_h, ny);

            let top = luts[ty1 * nx + tx1][value] as f32 * (1.0 - xa)
                + luts[ty1 * nx + tx2][value] as f32 * xa;
            let bottom = luts[ty2 * nx + tx1][value] as f32 * (1.0 - xa)
                + luts[ty2 * nx + tx2][value] as f32 * xa;
            let mapped = top * (1.0 - ya) + bottom * ya;

            pixel[0] = mapped.round().clamp(0.0, 255.0) as u8;
        }
        output
    }

    fn tile_lut(&self, image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> [u8; BINS] {
        let mut hist = [0usize; BINS];
        for y in y0..y1 {
            for x in x0..x1 {
                hist[image.get_pixel(x, y)[0] as usize] += 1;
            }
        }
        let area = ((x1 - x0) * (y1 - y0)) as usize;

        if self.clip_limit > 0.0 {
            let clip = ((self.clip_limit * area as f32 / BINS as f32) as usize).max(1);
            clip_histogram(&mut hist, clip);
        }

        let scale = 255.0 / area as f32;
        let mut lut = [0u8; BINS];
        let mut cumulative = 0usize;
        for (entry, count) in lut.iter_mut().zip(hist.iter()) {
            cumulative += count;
            *entry = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}

/// Clips every bin at `clip` and spreads the excess evenly over all bins.
fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let per_bin = excess / BINS;
    let residual = excess - per_bin * BINS;
    for count in hist.iter_mut() {
        *count += per_bin;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        for count in hist.iter_mut().step_by(step).take(residual) {
            *count += 1;
        }
    }
}

/// Indices of the two tiles whose centres bracket `pos`, and the weight of the second.
fn neighbours(pos: u32, tile_size: u32, tiles: usize) -> (usize, usize, f32) {
    let t = pos as f32 / tile_size as f32 - 0.5;
    let first = t.floor();
    let weight = t - first;
    let first = first as isize;
    let lower = first.max(0) as usize;
    let upper = ((first + 1).max(0) as usize).min(tiles - 1);
    (lower.min(tiles - 1), upper, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(Clahe::new(-1.0, 8, 8).is_err());
        assert!(Clahe::new(f32::NAN, 8, 8).is_err());
        assert!(Clahe::new(2.0, 0, 8).is_err());
        assert!(Clahe::new(2.0, 8, 8).is_ok());
    }

    #[test]
    fn test_preserves_dimensions() {
        let image = GrayImage::from_fn(37, 19, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let output = Clahe::default().apply(&image);
        assert_eq!(output.dimensions(), (37, 19));
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let image = GrayImage::from_pixel(40, 40, Luma([120]));
        let output = Clahe::default().apply(&image);
        let first = output.get_pixel(0, 0)[0];
        assert!(output.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_stretches_low_contrast_input() {
        // Values confined to [100, 130].
        let image = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 31) as u8]));
        let output = Clahe::default().apply(&image);

        let (min_in, max_in) = (100u8, 130u8);
        let min_out = output.pixels().map(|p| p[0]).min().unwrap();
        let max_out = output.pixels().map(|p| p[0]).max().unwrap();
        assert!(max_out - min_out > max_in - min_in);
    }

    #[test]
    fn test_preserves_ordering_within_tile() {
        let image = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 10) as u8]));
        let output = Clahe::new(0.0, 1, 1).unwrap().apply(&image);
        for x in 1..16 {
            assert!(output.get_pixel(x, 0)[0] >= output.get_pixel(x - 1, 0)[0]);
        }
    }

    #[test]
    fn test_tiny_images() {
        let image = GrayImage::from_fn(3, 2, |x, y| Luma([(x * 50 + y * 20) as u8]));
        let output = Clahe::default().apply(&image);
        assert_eq!(output.dimensions(), (3, 2));

        let empty = GrayImage::new(0, 0);
        assert_eq!(Clahe::default().apply(&empty).dimensions(), (0, 0));
    }

    #[test]
    fn test_clip_histogram_conserves_mass() {
        let mut hist = [0usize; BINS];
        hist[10] = 500;
        hist[200] = 12;
        let before: usize = hist.iter().sum();
        clip_histogram(&mut hist, 20);
        let after: usize = hist.iter().sum();
        assert_eq!(before, after);
        assert!(hist[10] <= 20 + 2 + 1);
    }
}
