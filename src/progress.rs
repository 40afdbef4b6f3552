//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the run moves from discovery to the model call. The binary uses
//! this to drive its spinner; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use archscan::{AnalysisConfig, AnalysisProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct DropCounter {
//!     dropped: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for DropCounter {
//!     fn on_image_dropped(&self, path: &Path, error: &str) {
//!         self.dropped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("skipped {}: {error}", path.display());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(DropCounter { dropped: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline at each stage boundary.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in pipeline order from a single task.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Inputs were discovered.
    fn on_discovery(&self, pdfs: usize, images: usize) {
        let _ = (pdfs, images);
    }

    /// A PDF was rasterised into `pages` images.
    fn on_pdf_rasterised(&self, pdf: &Path, pages: usize) {
        let _ = (pdf, pages);
    }

    /// The sampler picked `sampled` images out of a pool of `pool`.
    fn on_sampled(&self, sampled: usize, pool: usize) {
        let _ = (sampled, pool);
    }

    /// An image was resized and encoded for transport.
    fn on_image_encoded(&self, path: &Path) {
        let _ = path;
    }

    /// An image failed to encode and was dropped from the batch.
    fn on_image_dropped(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// The request carrying `images` images is about to be sent.
    fn on_request_sent(&self, images: usize) {
        let _ = images;
    }

    /// The model's answer was extracted; `chars` is its length in characters.
    fn on_analysis_complete(&self, chars: usize) {
        let _ = chars;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
