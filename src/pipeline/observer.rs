//! Post-prediction hooks.
//!
//! Observers run after a result has been produced and never influence it.
//! The service invokes them on a blocking task without awaiting completion.

use crate::core::errors::DigitError;
use crate::core::predictions::{MultiDigitPrediction, SinglePrediction};
use image::{GrayImage, ImageFormat};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Receives every successful prediction together with its decoded input.
pub trait PredictionObserver: Send + Sync + Debug {
    /// Called after a single-digit prediction.
    fn on_single(&self, raw: &GrayImage, result: &SinglePrediction);

    /// Called after a multi-digit prediction.
    fn on_multi(&self, raw: &GrayImage, result: &MultiDigitPrediction);
}

/// Writes inputs and canonical previews as PNG files into a directory.
///
/// Files are overwritten on every request: `input.png` and `preprocessed.png`
/// for single-digit requests, `multi_input.png` and one
/// `multi_pre_{x}_{y}.png` per region for multi-digit requests.
#[derive(Debug, Clone)]
pub struct DebugDumpObserver {
    dir: PathBuf,
}

impl DebugDumpObserver {
    /// Creates an observer writing into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DigitError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_image(&self, name: &str, image: &GrayImage) {
        let path = self.dir.join(name);
        if let Err(err) = image.save_with_format(&path, ImageFormat::Png) {
            warn!(path = %path.display(), error = %err, "Failed to write debug image");
        }
    }

    fn save_bytes(&self, name: &str, bytes: &[u8]) {
        let path = self.dir.join(name);
        if let Err(err) = fs::write(&path, bytes) {
            warn!(path = %path.display(), error = %err, "Failed to write debug image");
        }
    }
}

impl PredictionObserver for DebugDumpObserver {
    fn on_single(&self, raw: &GrayImage, result: &SinglePrediction) {
        self.save_image("input.png", raw);
        self.save_bytes("preprocessed.png", &result.preview_png);
        debug!(dir = %self.dir.display(), "Dumped single-digit debug images");
    }

    fn on_multi(&self, raw: &GrayImage, result: &MultiDigitPrediction) {
        self.save_image("multi_input.png", raw);
        for digit in &result.digits {
            let name = format!("multi_pre_{}_{}.png", digit.bbox.x, digit.bbox.y);
            self.save_bytes(&name, &digit.preview_png);
        }
        debug!(
            dir = %self.dir.display(),
            regions = result.count(),
            "Dumped multi-digit debug images"
        );
    }
}
