use serde::{Deserialize, Serialize};

use super::roi::Roi;

/// OCR-ready image produced by the preprocessor
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// Losslessly encoded (PNG) binarized raster
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Region of the source frame the image was cut from
    pub source_roi: Roi,
}

/// Text returned by one recognition call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recognition {
    pub text: String,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
