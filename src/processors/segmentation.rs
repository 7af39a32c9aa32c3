//! Connected-component segmentation of multi-digit images.
//!
//! The whole page is binarised once (inverted Otsu), outermost contours are
//! traced, and each contour's bounding box becomes a candidate [`Region`].
//! Boxes narrower or shorter than the minimum size are dropped as noise and the
//! survivors are returned in left-to-right reading order.

use crate::core::predictions::BoundingBox;
use crate::processors::binarize;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use tracing::debug;

/// A candidate digit: its box on the source image and the pixels it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Location on the source image.
    pub bbox: BoundingBox,
    /// The grayscale sub-image under `bbox`.
    pub pixels: GrayImage,
    /// Estimated paper intensity of the source image, used to fill margins.
    pub background: u8,
}

impl Region {
    /// The region's pixels surrounded by a margin of `fraction` × the larger side.
    ///
    /// The margin is filled with the paper intensity, so it reads as background
    /// once the crop is binarised again.
    pub fn with_margin(&self, fraction: f32) -> GrayImage {
        let pad = (fraction.max(0.0) * self.bbox.max_side() as f32).round() as u32;
        if pad == 0 {
            return self.pixels.clone();
        }
        let (w, h) = self.pixels.dimensions();
        let mut canvas = GrayImage::from_pixel(w + 2 * pad, h + 2 * pad, Luma([self.background]));
        image::imageops::replace(&mut canvas, &self.pixels, pad as i64, pad as i64);
        canvas
    }
}

/// Splits a page image into per-digit regions.
#[derive(Debug, Clone)]
pub struct Segmenter {
    min_size: u32,
}

impl Segmenter {
    /// Creates a segmenter discarding boxes with a side shorter than `min_size`.
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }

    /// The configured minimum side length.
    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    /// Finds digit regions, sorted by ascending `x`.
    ///
    /// Regions sharing an `x` keep their detection order. An image without
    /// any surviving region yields an empty list.
    pub fn segment(&self, raw: &GrayImage) -> Vec<Region> {
        let (width, height) = raw.dimensions();
        if width == 0 || height == 0 || binarize::is_uniform(raw) {
            return Vec::new();
        }

        let binary = binarize::otsu_inverted(raw);
        let background = binarize::background_level(raw, binary.level);
        let contours = find_contours::<u32>(&binary.image);

        let mut regions: Vec<Region> = contours
            .iter()
            .filter(|c| is_external(c))
            .filter_map(contour_bounds)
            .filter(|bbox| bbox.width >= self.min_size && bbox.height >= self.min_size)
            .map(|bbox| Region {
                bbox,
                pixels: image::imageops::crop_imm(raw, bbox.x, bbox.y, bbox.width, bbox.height)
                    .to_image(),
                background,
            })
            .collect();

        // Stable sort keeps detection order for equal x.
        regions.sort_by_key(|r| r.bbox.x);

        debug!(
            contours = contours.len(),
            regions = regions.len(),
            level = binary.level,
            "Segmented image"
        );
        regions
    }
}

/// Outermost borders only; components nested inside holes are ignored.
fn is_external(contour: &Contour<u32>) -> bool {
    contour.border_type == BorderType::Outer && contour.parent.is_none()
}

fn contour_bounds(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_blocks(blocks: &[(u32, u32, u32, u32)]) -> GrayImage {
        GrayImage::from_fn(120, 50, |x, y| {
            let inked = blocks
                .iter()
                .any(|&(bx, by, bw, bh)| x >= bx && x < bx + bw && y >= by && y < by + bh);
            Luma([if inked { 20 } else { 230 }])
        })
    }

    #[test]
    fn test_regions_sorted_left_to_right() {
        let page = page_with_blocks(&[(80, 10, 12, 25), (10, 12, 12, 25), (45, 8, 12, 25)]);
        let regions = Segmenter::new(10).segment(&page);
        let xs: Vec<u32> = regions.iter().map(|r| r.bbox.x).collect();
        assert_eq!(xs, vec![10, 45, 80]);
        assert_eq!(regions[0].bbox, BoundingBox::new(10, 12, 12, 25));
        assert_eq!(regions[0].pixels.dimensions(), (12, 25));
        assert_eq!(regions[0].background, 230);
    }

    #[test]
    fn test_small_components_are_discarded() {
        let page = page_with_blocks(&[(10, 10, 12, 25), (60, 20, 3, 3), (90, 5, 30, 6)]);
        let regions = Segmenter::new(10).segment(&page);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox.x, 10);
    }

    #[test]
    fn test_blank_page_yields_no_regions() {
        let page = GrayImage::from_pixel(64, 64, Luma([240]));
        assert!(Segmenter::new(10).segment(&page).is_empty());
    }

    #[test]
    fn test_nested_component_is_not_a_region() {
        // A ring with a blob inside its hole.
        let page = GrayImage::from_fn(80, 80, |x, y| {
            let ring = (10..70).contains(&x)
                && (10..70).contains(&y)
                && !((16..64).contains(&x) && (16..64).contains(&y));
            let blob = (30..50).contains(&x) && (30..50).contains(&y);
            Luma([if ring || blob { 10 } else { 240 }])
        });
        let regions = Segmenter::new(10).segment(&page);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(10, 10, 60, 60));
    }

    #[test]
    fn test_deterministic() {
        let page = page_with_blocks(&[(30, 10, 12, 25), (30, 38, 15, 11), (70, 12, 11, 20)]);
        let segmenter = Segmenter::new(10);
        assert_eq!(segmenter.segment(&page), segmenter.segment(&page));
    }

    #[test]
    fn test_equal_x_keeps_detection_order() {
        // Two blocks stacked in the same column: the upper one is traced first.
        let page = page_with_blocks(&[(30, 2, 12, 15), (30, 30, 12, 15)]);
        let regions = Segmenter::new(10).segment(&page);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox.y, 2);
        assert_eq!(regions[1].bbox.y, 30);
    }

    #[test]
    fn test_margin_uses_background() {
        let page = page_with_blocks(&[(10, 10, 12, 25)]);
        let region = Segmenter::new(10).segment(&page).remove(0);
        let padded = region.with_margin(0.2);
        assert_eq!(padded.dimensions(), (12 + 10, 25 + 10));
        assert_eq!(padded.get_pixel(0, 0)[0], 230);
        assert_eq!(padded.get_pixel(5, 5)[0], 20);
        assert_eq!(region.with_margin(0.0), region.pixels);
    }
}
