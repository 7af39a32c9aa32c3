//! Shared fixtures: a seven-segment glyph renderer and a template classifier.
#![allow(dead_code)]

use digit_ocr::core::{DigitClassifier, DigitError, Tensor2D, Tensor4D, NUM_CLASSES};
use digit_ocr::processors::DigitNormalizer;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use ndarray::{Array2, Axis};

pub const PAPER: u8 = 232;
pub const INK: u8 = 28;

pub const GLYPH_WIDTH: u32 = 36;
pub const GLYPH_HEIGHT: u32 = 64;
pub const STROKE_RADIUS: i32 = 5;

// Segment endpoints in a unit box: a top, b upper right, c lower right,
// d bottom, e lower left, f upper left, g middle.
const SEGMENTS: [((f32, f32), (f32, f32)); 7] = [
    ((0.0, 0.0), (1.0, 0.0)),
    ((1.0, 0.0), (1.0, 0.5)),
    ((1.0, 0.5), (1.0, 1.0)),
    ((0.0, 1.0), (1.0, 1.0)),
    ((0.0, 0.5), (0.0, 1.0)),
    ((0.0, 0.0), (0.0, 0.5)),
    ((0.0, 0.5), (1.0, 0.5)),
];

fn segments_for(digit: u8) -> &'static [usize] {
    match digit {
        0 => &[0, 1, 2, 3, 4, 5],
        1 => &[1, 2],
        2 => &[0, 1, 6, 4, 3],
        3 => &[0, 1, 6, 2, 3],
        4 => &[5, 6, 1, 2],
        5 => &[0, 5, 6, 2, 3],
        6 => &[0, 5, 6, 4, 3, 2],
        7 => &[0, 1, 2],
        8 => &[0, 1, 2, 3, 4, 5, 6],
        _ => &[0, 1, 2, 3, 5, 6],
    }
}

/// Draws `digit` with round-capped strokes into the box at `(x0, y0)`.
pub fn draw_glyph(canvas: &mut GrayImage, digit: u8, x0: i32, y0: i32) {
    let w = GLYPH_WIDTH as f32;
    let h = GLYPH_HEIGHT as f32;
    for &segment in segments_for(digit) {
        let ((ax, ay), (bx, by)) = SEGMENTS[segment];
        let (sx, sy) = (x0 as f32 + ax * w, y0 as f32 + ay * h);
        let (ex, ey) = (x0 as f32 + bx * w, y0 as f32 + by * h);
        let steps = ((ex - sx).abs().max((ey - sy).abs())).ceil() as i32;
        for i in 0..=steps {
            let t = i as f32 / steps.max(1) as f32;
            let cx = (sx + (ex - sx) * t).round() as i32;
            let cy = (sy + (ey - sy) * t).round() as i32;
            draw_filled_circle_mut(canvas, (cx, cy), STROKE_RADIUS, Luma([INK]));
        }
    }
}

/// A single centred digit on an 80×100 sheet of paper.
pub fn render_digit(digit: u8) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(80, 100, Luma([PAPER]));
    let x0 = (80 - GLYPH_WIDTH as i32) / 2;
    let y0 = (100 - GLYPH_HEIGHT as i32) / 2;
    draw_glyph(&mut canvas, digit, x0, y0);
    canvas
}

/// Digits side by side with `gap` pixels between glyph boxes.
pub fn render_sequence(digits: &[u8], gap: u32) -> GrayImage {
    let margin = 20u32;
    let pitch = GLYPH_WIDTH + gap;
    let width = margin * 2 + pitch * digits.len() as u32;
    let height = GLYPH_HEIGHT + margin * 2;
    let mut canvas = GrayImage::from_pixel(width, height, Luma([PAPER]));
    for (i, &digit) in digits.iter().enumerate() {
        let x0 = (margin + i as u32 * pitch) as i32;
        draw_glyph(&mut canvas, digit, x0, margin as i32);
    }
    canvas
}

/// Deterministic per-pixel noise in `[-amplitude, amplitude]`.
pub fn add_noise(image: &GrayImage, amplitude: i32, seed: u64) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let mut h = seed ^ ((x as u64) << 32 | y as u64);
        h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= h >> 29;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 32;
        let offset = (h % (2 * amplitude as u64 + 1)) as i32 - amplitude;
        let value = image.get_pixel(x, y)[0] as i32 + offset;
        Luma([value.clamp(0, 255) as u8])
    })
}

/// Scores digits by cosine similarity with normalised reference glyphs.
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    templates: Vec<Array2<f32>>,
    temperature: f32,
}

impl TemplateClassifier {
    pub fn new() -> Self {
        let normalizer = DigitNormalizer::new();
        let templates = (0..NUM_CLASSES as u8)
            .map(|d| normalizer.normalize(&render_digit(d)).digit.into_array())
            .collect();
        Self {
            templates,
            temperature: 25.0,
        }
    }

    fn scores(&self, plane: ndarray::ArrayView2<'_, f32>) -> Vec<f32> {
        let norm = plane.iter().map(|v| v * v).sum::<f32>().sqrt();
        let sims: Vec<f32> = self
            .templates
            .iter()
            .map(|t| {
                let t_norm = t.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm == 0.0 || t_norm == 0.0 {
                    0.0
                } else {
                    (&plane * t).sum() / (norm * t_norm)
                }
            })
            .collect();
        let max = sims.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = sims
            .iter()
            .map(|s| ((s - max) * self.temperature).exp())
            .collect();
        let total: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

impl DigitClassifier for TemplateClassifier {
    fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
        let n = batch.len_of(Axis(0));
        let mut out = Array2::zeros((n, NUM_CLASSES));
        for (i, member) in batch.axis_iter(Axis(0)).enumerate() {
            let plane = member.index_axis(Axis(0), 0);
            for (c, p) in self.scores(plane).into_iter().enumerate() {
                out[[i, c]] = p;
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "template"
    }
}
