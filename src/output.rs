//! Result records returned by the analysis pipeline.

use crate::error::EncodeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The record produced by one successful run.
///
/// Serialised as-is into `analysis_result.json`. `sampled_images` holds the
/// sampler's picks, including any that were later dropped because they
/// failed to encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The resolved input directory.
    pub input_directory: String,
    /// Number of PDF files discovered.
    pub total_pdfs: usize,
    /// Rasterised PDF pages plus directly supplied images.
    pub total_images: usize,
    /// Paths chosen by the sampler, in sample order.
    pub sampled_images: Vec<String>,
    /// `choices[0].message.content` of the model response.
    pub analysis: String,
    /// The response body exactly as received.
    pub raw_response: serde_json::Value,
    /// Sampled images that could not be encoded and were left out of the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_images: Vec<EncodeError>,
}

/// Header-level facts about one image, read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Detected container format, e.g. `"Jpeg"` or `"Png"`.
    pub format: Option<String>,
}

/// What an input directory holds, as reported by [`crate::analyze::inspect`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputInventory {
    pub input_directory: String,
    pub pdfs: Vec<PathBuf>,
    pub images: Vec<ImageInfo>,
    /// Images whose header could not be read, with the reason.
    pub unreadable: Vec<(PathBuf, String)>,
}
