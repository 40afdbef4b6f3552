//! Error types for the archscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalysisError`] — **Fatal**: the run cannot produce a result at all
//!   (missing input directory, nothing to analyse, the model endpoint is
//!   unreachable or answered with something unusable). Returned as
//!   `Err(AnalysisError)` from the top-level `analyze*` functions.
//!
//! * [`EncodeError`] — **Non-fatal**: a single sampled image could not be
//!   opened or re-encoded. The image is logged and dropped from the batch;
//!   the run only fails when no image at all survives encoding.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the archscan library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The input path exists but is a regular file.
    #[error("Input path '{path}' is not a directory")]
    InputNotADirectory { path: PathBuf },

    /// Neither PDFs nor images were found in the input directory.
    #[error("No PDF or image files found in '{dir}'\nSupported: .pdf, .jpg, .jpeg, .png")]
    NoInputFiles { dir: PathBuf },

    /// Every sampled image failed to encode, leaving nothing to send.
    #[error("None of the {sampled} sampled images could be encoded{}",
        first_error_suffix(.first_error))]
    NoEncodableImages {
        sampled: usize,
        first_error: Option<String>,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt, or the PDF is password protected.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page could not be rendered or its image could not be written.
    #[error("Rasterisation failed for '{path}' page {page}: {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No API key was configured for the default chat-completion client.
    #[error("API key not found.\nSet OPENAI_API_KEY or pass --api-key.")]
    MissingApiKey,

    /// The request never produced a 2xx response.
    #[error("Request to '{url}' failed{}: {reason}",
        status_suffix(.status))]
    Transport {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The response body lacks `choices[0].message.content`.
    #[error("Invalid response format from LLM API: {detail}")]
    MalformedResponse { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory listing or directory creation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn first_error_suffix(first_error: &Option<String>) -> String {
    first_error
        .as_ref()
        .map(|e| format!("\nFirst error: {e}"))
        .unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {s}")).unwrap_or_default()
}

/// A non-fatal error for a single image.
///
/// The orchestrator drops the image and keeps going; the batch shrinks
/// rather than being topped up with another sample.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum EncodeError {
    /// The file could not be opened or its format could not be guessed.
    #[error("{path}: cannot open image: {detail}")]
    Open { path: PathBuf, detail: String },

    /// The file opened but its pixels could not be decoded.
    #[error("{path}: cannot decode image: {detail}")]
    Decode { path: PathBuf, detail: String },

    /// The resized pixel buffer could not be written as JPEG.
    #[error("{path}: cannot encode JPEG: {detail}")]
    Encode { path: PathBuf, detail: String },
}

impl EncodeError {
    /// Path of the image that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            EncodeError::Open { path, .. }
            | EncodeError::Decode { path, .. }
            | EncodeError::Encode { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_with_status() {
        let e = AnalysisError::Transport {
            url: "https://api.example.test/v1/chat/completions".into(),
            status: Some(401),
            reason: "invalid key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 401"), "got: {msg}");
        assert!(msg.contains("invalid key"));
    }

    #[test]
    fn transport_display_without_status() {
        let e = AnalysisError::Transport {
            url: "http://127.0.0.1:9".into(),
            status: None,
            reason: "connection refused".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
    }

    #[test]
    fn no_encodable_images_display() {
        let e = AnalysisError::NoEncodableImages {
            sampled: 3,
            first_error: Some("a.jpg: cannot decode image: bad header".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 sampled"));
        assert!(msg.contains("bad header"));

        let e = AnalysisError::NoEncodableImages {
            sampled: 0,
            first_error: None,
        };
        assert!(!e.to_string().contains("First error"));
    }

    #[test]
    fn encode_error_exposes_path() {
        let e = EncodeError::Decode {
            path: PathBuf::from("scans/page_1.jpg"),
            detail: "truncated".into(),
        };
        assert_eq!(e.path(), std::path::Path::new("scans/page_1.jpg"));
        assert!(e.to_string().contains("truncated"));
    }
}
