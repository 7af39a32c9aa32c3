//! Image processing stages for digit recognition.
//!
//! # Modules
//!
//! * `augmentation` - Deterministic test-time perturbations of canonical digits
//! * `binarize` - Inverted Otsu thresholding
//! * `clahe` - Contrast limited adaptive histogram equalisation
//! * `morphology` - 2×2 stroke dilation
//! * `normalization` - Canonicalisation of raw digit crops to 28×28
//! * `resize` - Area-averaging resize
//! * `segmentation` - Connected-component splitting of multi-digit images
//! * `topk` - Ranking of class distributions

pub mod augmentation;
pub mod binarize;
pub mod clahe;
pub mod morphology;
pub mod normalization;
pub mod resize;
pub mod segmentation;
pub mod topk;

pub use augmentation::Augmenter;
pub use binarize::{otsu_inverted, Binarized};
pub use clahe::Clahe;
pub use morphology::{dilate_2x2, dilate_2x2_plane};
pub use normalization::{CanonicalDigit, DigitNormalizer, NormalizedDigit, CANONICAL_SIZE};
pub use resize::resize_area;
pub use segmentation::{Region, Segmenter};
pub use topk::{Topk, TopkResult};
