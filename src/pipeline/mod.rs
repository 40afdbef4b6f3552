//! Pipeline stages for archival material analysis.
//!
//! Each submodule implements exactly one step, so each can be tested on
//! its own and the rasterizer or model client can be swapped without
//! touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ render ──▶ sample ──▶ encode ──▶ llm
//! (dir scan)   (pdfium)   (policy)   (JPEG/b64)  (one POST)
//! ```
//!
//! 1. [`discover`] — validate the input directory and list PDFs and images
//! 2. [`render`]   — rasterise every PDF page to `page_<n>.jpg`; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`sample`]   — pick the first two pages plus a random draw, bounded by
//!    the configured sample size
//! 4. [`encode`]   — downscale and JPEG/base64-encode each sampled image
//! 5. [`llm`]      — build the multimodal request, send it once, extract the
//!    answer; the only stage with network I/O

pub mod discover;
pub mod encode;
pub mod llm;
pub mod render;
pub mod sample;
