//! Top-level analysis entry points.
//!
//! [`analyze`] runs one pass over an input directory:
//!
//! ```text
//! discover → rasterise PDFs → pool → sample → encode → one model call → result
//! ```
//!
//! Each stage completes before the next begins. A fatal [`AnalysisError`]
//! anywhere aborts the run; an image that fails to encode is dropped and the
//! run carries on with the rest.

use crate::config::{AnalysisConfig, RESULT_FILE_NAME};
use crate::error::{AnalysisError, EncodeError};
use crate::output::{AnalysisResult, InputInventory};
use crate::pipeline::discover::{discover_inputs, resolve_input_dir};
use crate::pipeline::encode::{encode_image, inspect_image, EncodedImage};
use crate::pipeline::llm::{extract_text, ChatCompletionsClient, VisionClient};
use crate::pipeline::render::{rasterize_pdf, PageDirs, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::sample::{rng_from_seed, sample_images};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Analyse the archival material in `input_dir`.
///
/// # Errors
/// Returns `Err(AnalysisError)` for fatal errors only:
/// - the directory is missing, not a directory, or holds no PDFs/images
/// - a PDF cannot be opened or rasterised
/// - every sampled image failed to encode
/// - the model call failed or its response lacks the analysis text
pub async fn analyze(
    input_dir: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let total_start = Instant::now();
    let input_dir = resolve_input_dir(input_dir.as_ref())?;
    info!("Starting analysis of {}", input_dir.display());

    // ── Step 1: Discover inputs ──────────────────────────────────────────
    let inputs = discover_inputs(&input_dir)?;
    if inputs.is_empty() {
        return Err(AnalysisError::NoInputFiles { dir: input_dir });
    }
    info!(
        "Found {} PDF files and {} image files",
        inputs.pdfs.len(),
        inputs.images.len()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_discovery(inputs.pdfs.len(), inputs.images.len());
    }

    // ── Step 2: Resolve collaborators ────────────────────────────────────
    // After discovery so an empty directory never needs a key.
    let rasterizer = resolve_rasterizer(config);
    let client = resolve_client(config)?;

    // ── Step 3: Rasterise PDFs ───────────────────────────────────────────
    let mut pool: Vec<PathBuf> = Vec::new();
    let mut page_dirs = PageDirs::new();
    for pdf in &inputs.pdfs {
        let out_dir = page_dirs.claim(&config.output_dir, pdf);
        let pages = rasterize_pdf(Arc::clone(&rasterizer), pdf, &out_dir).await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_pdf_rasterised(pdf, pages.len());
        }
        pool.extend(pages);
    }

    // ── Step 4: Pool and sample ──────────────────────────────────────────
    pool.extend(inputs.images.iter().cloned());
    let total_images = pool.len();
    info!("Total images to analyze: {}", total_images);

    let mut rng = rng_from_seed(config.seed);
    let sampled = sample_images(&pool, config.sample_size, &mut rng);
    info!("Selected {} images for analysis", sampled.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_sampled(sampled.len(), total_images);
    }

    // ── Step 5: Encode ───────────────────────────────────────────────────
    let EncodedSample {
        images: encoded,
        dropped,
    } = encode_sample(&sampled, config)?;

    // ── Step 6: Model call ───────────────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_request_sent(encoded.len());
    }
    let envelope = client.analyze(&encoded, &config.material_types).await?;
    let analysis = extract_text(&envelope)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(analysis.len());
    }

    info!(
        "Analysis complete: {} images sent, {} chars, {}ms total",
        encoded.len(),
        analysis.len(),
        total_start.elapsed().as_millis()
    );

    Ok(AnalysisResult {
        input_directory: input_dir.display().to_string(),
        total_pdfs: inputs.pdfs.len(),
        total_images,
        sampled_images: sampled.iter().map(|p| p.display().to_string()).collect(),
        analysis,
        raw_response: envelope.into_value(),
        dropped_images: dropped,
    })
}

/// Run [`analyze`] and write the result to `<output_dir>/analysis_result.json`.
///
/// The file is written only when the run succeeds, through a temp file and a
/// rename so a reader never sees a partial document.
pub async fn analyze_to_file(
    input_dir: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let result = analyze(input_dir, config).await?;
    let path = result_path(config);
    write_result(&result, &path).await?;
    info!("Results saved to {}", path.display());
    Ok(result)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_dir: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_dir, config))
}

/// List what `input_dir` holds without rasterising or calling the model.
///
/// Does not require an API key.
pub async fn inspect(input_dir: impl AsRef<Path>) -> Result<InputInventory, AnalysisError> {
    let input_dir = resolve_input_dir(input_dir.as_ref())?;
    let inputs = discover_inputs(&input_dir)?;

    let mut inventory = InputInventory {
        input_directory: input_dir.display().to_string(),
        pdfs: inputs.pdfs,
        ..Default::default()
    };
    for path in inputs.images {
        match inspect_image(&path) {
            Ok(info) => inventory.images.push(info),
            Err(e) => {
                warn!("Cannot read image header: {}", e);
                inventory.unreadable.push((path, e.to_string()));
            }
        }
    }
    Ok(inventory)
}

/// Where [`analyze_to_file`] writes its result for `config`.
pub fn result_path(config: &AnalysisConfig) -> PathBuf {
    config.output_dir.join(RESULT_FILE_NAME)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_rasterizer(config: &AnalysisConfig) -> Arc<dyn PageRasterizer> {
    match config.rasterizer {
        Some(ref rasterizer) => Arc::clone(rasterizer),
        None => Arc::new(PdfiumRasterizer::from_config(config)),
    }
}

fn resolve_client(config: &AnalysisConfig) -> Result<Arc<dyn VisionClient>, AnalysisError> {
    match config.client {
        Some(ref client) => Ok(Arc::clone(client)),
        None => Ok(Arc::new(ChatCompletionsClient::from_config(config)?)),
    }
}

/// Encoded images plus the sampled images that were dropped.
struct EncodedSample {
    images: Vec<EncodedImage>,
    dropped: Vec<EncodeError>,
}

/// Encode every sampled path, dropping the ones that fail.
fn encode_sample(
    sampled: &[PathBuf],
    config: &AnalysisConfig,
) -> Result<EncodedSample, AnalysisError> {
    let mut images = Vec::with_capacity(sampled.len());
    let mut dropped: Vec<EncodeError> = Vec::new();

    for path in sampled {
        match encode_image(path, config.max_image_dimension, config.jpeg_quality) {
            Ok(img) => {
                debug!("Encoded {}", path.display());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_encoded(path);
                }
                images.push(img);
            }
            Err(e) => {
                warn!("Dropping image, {}", e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_dropped(e.path(), &e.to_string());
                }
                dropped.push(e);
            }
        }
    }

    if images.is_empty() {
        return Err(AnalysisError::NoEncodableImages {
            sampled: sampled.len(),
            first_error: dropped.first().map(ToString::to_string),
        });
    }
    Ok(EncodedSample { images, dropped })
}

async fn write_result(result: &AnalysisResult, path: &Path) -> Result<(), AnalysisError> {
    let write_failed = |e: std::io::Error| AnalysisError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(write_failed)?;
    }

    let json = serde_json::to_string_pretty(result)
        .map_err(|e| AnalysisError::Internal(format!("Cannot serialise result: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;
    Ok(())
}
