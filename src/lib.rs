//! # Digit OCR
//!
//! A Rust library that recognises handwritten digits in raster images, one at
//! a time or as a left-to-right sequence, using any pre-trained 10-class
//! classifier (ONNX models supported behind the `onnx` feature).
//!
//! ## Features
//!
//! - Canonicalisation of raw crops to 28×28 tensors (CLAHE, Otsu, median
//!   filter, dilation, contour crop, square padding, area resize)
//! - Connected-component segmentation of multi-digit images
//! - Test-time augmentation ensemble with single-pass fallback
//! - Admission control: bounded concurrency and per-caller rate limiting
//! - Async service facade on tokio with statistics and debug dumps
//!
//! ## Modules
//!
//! * [`core`] - Error handling, configuration, tensors, classifier trait and result types
//! * [`processors`] - Image processing stages
//! * [`predictor`] - The augmentation-ensemble predictor
//! * [`pipeline`] - Synchronous pipeline, admission governor and async service
//! * [`utils`] - Image decoding and encoding helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use digit_ocr::prelude::*;
//! use std::sync::Arc;
//!
//! # #[derive(Debug)]
//! # struct MyModel;
//! # impl DigitClassifier for MyModel {
//! #     fn predict_batch(&self, batch: &Tensor4D) -> DigitResult<Tensor2D> {
//! #         Ok(Tensor2D::from_elem((batch.shape()[0], NUM_CLASSES), 0.1))
//! #     }
//! # }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecognizerConfig::from_env()?;
//! let service = RecognitionService::new(config, Some(Arc::new(MyModel)))?;
//!
//! let bytes = std::fs::read("digits.png")?;
//! let result = service.predict_multi_encoded("127.0.0.1", &bytes).await?;
//! println!("recognised {}", result.text);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod core;
pub mod pipeline;
pub mod predictor;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use digit_ocr::prelude::*;
/// ```
///
/// Included items focus on the most common tasks:
/// - The async service and its configuration
/// - The synchronous pipeline for callers managing their own concurrency
/// - The classifier trait and tensor aliases needed to implement it
/// - Result and error types
pub mod prelude {
    // Service and pipeline (essential)
    pub use crate::pipeline::{DigitPipeline, RecognitionService};

    // Configuration
    pub use crate::core::RecognizerConfig;

    // Classifier capability
    pub use crate::core::{DigitClassifier, Tensor2D, Tensor4D, NUM_CLASSES};
    #[cfg(feature = "onnx")]
    pub use crate::core::OrtDigitClassifier;

    // Results and errors
    pub use crate::core::{
        DigitError, DigitResult, MultiDigitPrediction, PredictionResult, RecognitionError,
        SinglePrediction,
    };

    // Image utility (minimal)
    pub use crate::utils::{decode_gray, load_gray_image};
}
