//! Utility functions for the digit recognition pipeline.
//!
//! This module provides image decoding and encoding helpers used throughout
//! the pipeline, and logging setup.

pub mod image;

// Re-export image processing functions
pub use image::{decode_gray, dynamic_to_gray, encode_png, load_gray_image};

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and formatting layer.
/// It's typically called at the start of an application to enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
