//! Utility functions for image loading and encoding.
//!
//! Every pipeline stage works on 8-bit grayscale. These helpers decode
//! uploaded bytes or files into [`GrayImage`] and encode previews as PNG.

use crate::core::errors::DigitError;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Converts a DynamicImage to a GrayImage.
pub fn dynamic_to_gray(img: DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Decodes image bytes in any supported format into grayscale.
///
/// # Errors
///
/// Returns `DigitError::InvalidInput` for an empty payload and
/// `DigitError::ImageLoad` when the bytes cannot be decoded.
pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, DigitError> {
    if bytes.is_empty() {
        return Err(DigitError::invalid_input("image payload is empty"));
    }
    let img = image::load_from_memory(bytes).map_err(DigitError::ImageLoad)?;
    let gray = dynamic_to_gray(img);
    if gray.width() == 0 || gray.height() == 0 {
        return Err(DigitError::invalid_input("image has zero area"));
    }
    Ok(gray)
}

/// Loads an image file and converts it to grayscale.
///
/// # Errors
///
/// Returns `DigitError::ImageLoad` if the file cannot be opened or decoded.
pub fn load_gray_image(path: &Path) -> Result<GrayImage, DigitError> {
    let img = image::open(path).map_err(DigitError::ImageLoad)?;
    Ok(dynamic_to_gray(img))
}

/// Encodes a grayscale image as PNG bytes.
///
/// # Errors
///
/// Returns `DigitError::ImageLoad` if the encoder fails.
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, DigitError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(DigitError::ImageLoad)?;
    Ok(buffer.into_inner())
}
