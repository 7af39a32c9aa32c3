//! The core module of the digit recognition pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Batch tensors and stacking helpers
//! - Configuration management
//! - Error handling
//! - The classifier capability trait and its ONNX Runtime implementation
//! - Prediction result types
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod batch;
pub mod config;
pub mod errors;
#[cfg(feature = "onnx")]
pub mod inference;
pub mod predictions;
pub mod traits;

pub use crate::utils::{decode_gray, dynamic_to_gray, encode_png, init_tracing, load_gray_image};
pub use batch::{stack_planes, Tensor2D, Tensor4D};
pub use config::{ConfigError, ConfigValidator, RecognizerConfig};
pub use errors::{DigitError, DigitResult, ProcessingStage, RecognitionError};
#[cfg(feature = "onnx")]
pub use inference::{load_session, OrtDigitClassifier, TensorLayout};
pub use predictions::{
    Alternative, BoundingBox, DetectedDigit, MultiDigitPrediction, PredictionResult,
    SinglePrediction,
};
pub use traits::{DigitClassifier, NUM_CLASSES};
