//! Prediction result types.
//!
//! All result types are serde-serialisable so that an outer HTTP or CLI layer
//! can return them directly. The `boundingBox` and `preprocessed_image` keys
//! match the JSON shape the drawing frontend reads; previews travel as
//! standard base64 strings of the PNG bytes.

use serde::{Deserialize, Serialize};

/// Serde adapter writing PNG bytes as a standard base64 string.
mod preview_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A runner-up class and its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// The digit class.
    pub digit: u8,
    /// Probability assigned to the class.
    pub confidence: f32,
}

/// The classification of one canonical digit.
///
/// `confidence` is the maximum of a distribution over ten classes and is
/// never lower than any reported alternative's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// The winning digit, `0..=9`.
    pub digit: u8,
    /// Probability of the winning digit, in `[0, 1]`.
    pub confidence: f32,
    /// The next most likely digits in descending confidence order,
    /// excluding `digit`.
    pub alternatives: Vec<Alternative>,
}

/// Axis-aligned box over the source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl BoundingBox {
    /// Creates a new box.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Length of the longer side.
    pub fn max_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Covered area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Result of a single-digit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePrediction {
    /// The classification.
    #[serde(flatten)]
    pub prediction: PredictionResult,
    /// PNG encoding of the 28×28 canonical digit, for display.
    #[serde(rename = "preprocessed_image", with = "preview_base64")]
    pub preview_png: Vec<u8>,
}

/// One digit found in a multi-digit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedDigit {
    /// Location in the source image.
    #[serde(rename = "boundingBox")]
    pub bbox: BoundingBox,
    /// The classification.
    #[serde(flatten)]
    pub prediction: PredictionResult,
    /// PNG encoding of the 28×28 canonical digit, for display.
    #[serde(rename = "preprocessed_image", with = "preview_base64")]
    pub preview_png: Vec<u8>,
}

/// Result of a multi-digit request.
///
/// `digits` is sorted by ascending `bbox.x`; an empty list is a valid outcome
/// flagged by `no_digits_detected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiDigitPrediction {
    /// Recognised digits in left-to-right reading order.
    #[serde(rename = "predictions")]
    pub digits: Vec<DetectedDigit>,
    /// The recognised digits concatenated in reading order.
    pub text: String,
    /// Set when segmentation found no region.
    pub no_digits_detected: bool,
}

impl MultiDigitPrediction {
    /// Assembles a result from digits already in reading order.
    pub fn from_digits(digits: Vec<DetectedDigit>) -> Self {
        let text = digits
            .iter()
            .map(|d| char::from(b'0' + d.prediction.digit))
            .collect::<String>();
        let no_digits_detected = digits.is_empty();
        Self {
            digits,
            text,
            no_digits_detected,
        }
    }

    /// Number of recognised digits.
    pub fn count(&self) -> usize {
        self.digits.len()
    }
}
