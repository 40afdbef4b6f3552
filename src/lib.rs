//! # archscan
//!
//! Characterise a folder of scanned archival material with a vision model.
//!
//! ## Why this crate?
//!
//! Archives receive boxes of digitised material (PDF scans of ledgers,
//! photographs, index cards) long before anyone has time to catalogue them.
//! This crate looks at a small sample of the pages and asks a vision LLM
//! what kind of material it is, what era it comes from, what condition it is
//! in and what digitisation challenges it poses. The answer is a first-pass
//! description, good enough to triage a collection.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input directory
//!  │
//!  ├─ 1. Discover  top-level *.pdf / *.jpg / *.jpeg / *.png (case-insensitive)
//!  ├─ 2. Render    every PDF page → <output>/<stem>/page_<n>.jpg (spawn_blocking)
//!  ├─ 3. Sample    first two pages + random draw, at most `sample_size`
//!  ├─ 4. Encode    downscale to 1024 px, JPEG → base64 data URL
//!  ├─ 5. Analyse   one chat-completion call with prompt + images
//!  └─ 6. Output    AnalysisResult (+ analysis_result.json)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archscan::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .seed(42)
//!         .build()?;
//!     let result = analyze("./data", &config).await?;
//!     println!("{}", result.analysis);
//!     eprintln!("{} of {} images sampled", result.sampled_images.len(), result.total_images);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `archscan` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! archscan = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! PDF rasterisation binds to a pdfium shared library at run time. Set
//! `PDFIUM_LIB_PATH` to its location, or place it in the working directory
//! or on the system library path. Folders holding only images never load it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_sync, analyze_to_file, inspect, result_path};
pub use config::{mask_secret, AnalysisConfig, AnalysisConfigBuilder};
pub use error::{AnalysisError, EncodeError};
pub use output::{AnalysisResult, ImageInfo, InputInventory};
pub use pipeline::encode::EncodedImage;
pub use pipeline::llm::{ChatCompletionsClient, ResponseEnvelope, VisionClient};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{build_prompt, MaterialType};
