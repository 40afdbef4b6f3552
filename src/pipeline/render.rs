//! PDF rasterisation: write every page of a PDF to `page_<n>.jpg` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`rasterize_pdf`] moves the work onto tokio's blocking pool so the runtime
//! worker never stalls on CPU-heavy rendering.
//!
//! ## Output layout
//!
//! ```text
//! <output_dir>/<pdf-stem>/page_1.jpg
//!                         page_2.jpg
//!                         …
//! ```

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages to image files on disk.
///
/// Implementations are called from a blocking thread and must write page
/// `n` (1-indexed) to [`page_image_path`]`(out_dir, n)`, returning the
/// written paths in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError>;
}

/// Path of page `page_num` (1-indexed) inside `out_dir`.
pub fn page_image_path(out_dir: &Path, page_num: usize) -> PathBuf {
    out_dir.join(format!("page_{page_num}.jpg"))
}

/// Hands out one page folder per PDF within a single run.
///
/// Folders are named after the PDF's file stem. Stems are compared
/// case-insensitively, so `scan.pdf` and `scan.PDF` never share a folder;
/// the later one gets `scan_2`, then `scan_3`, and so on.
#[derive(Debug, Default)]
pub struct PageDirs {
    claimed: HashSet<String>,
}

impl PageDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the subfolder of `output_dir` that `pdf`'s pages go to.
    pub fn claim(&mut self, output_dir: &Path, pdf: &Path) -> PathBuf {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let mut name = stem.clone();
        let mut suffix = 1;
        while !self.claimed.insert(name.to_lowercase()) {
            suffix += 1;
            name = format!("{stem}_{suffix}");
        }
        if suffix > 1 {
            warn!(
                "Page folder '{}' is already taken; rendering {} into '{}'",
                stem,
                pdf.display(),
                name
            );
        }
        output_dir.join(name)
    }
}

/// Rasterise `pdf` into `out_dir` on the blocking pool.
pub async fn rasterize_pdf(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf: &Path,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, AnalysisError> {
    let out_dir = out_dir.to_path_buf();
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| AnalysisError::Io {
            path: out_dir.clone(),
            source: e,
        })?;

    info!("Converting PDF to images: {}", pdf.display());
    let pdf_path = pdf.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf_path, &out_dir))
        .await
        .map_err(|e| AnalysisError::Internal(format!("Render task panicked: {}", e)))??;

    info!("Extracted {} images from {}", pages.len(), pdf.display());
    Ok(pages)
}

/// Bind to a pdfium shared library.
///
/// `PDFIUM_LIB_PATH` wins when set; otherwise the working directory is tried
/// before the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, AnalysisError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(Path::new(&path)),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| AnalysisError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Pixel size for a page of `width_pts`×`height_pts` rendered at `dpi`,
/// shrunk proportionally so neither edge exceeds `max_pixels`.
pub fn render_size(width_pts: f32, height_pts: f32, dpi: u32, max_pixels: u32) -> (i32, i32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let (mut w, mut h) = (width_pts * scale, height_pts * scale);
    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }
    ((w.round() as i32).max(1), (h.round() as i32).max(1))
}

/// The default rasterizer, backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            dpi: config.render_dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.pdf_password.clone(),
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium
            .load_pdf_from_file(pdf, self.password.as_deref())
            .map_err(|e| AnalysisError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        debug!("PDF loaded: {} pages", pages.len());

        let mut written = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let (w, h) = render_size(
                page.width().value,
                page.height().value,
                self.dpi,
                self.max_rendered_pixels,
            );
            let render_config = PdfRenderConfig::new()
                .set_target_width(w)
                .set_target_height(h);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                AnalysisError::RasterisationFailed {
                    path: pdf.to_path_buf(),
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let path = page_image_path(out_dir, page_num);
            bitmap
                .as_image()
                .into_rgb8()
                .save_with_format(&path, ImageFormat::Jpeg)
                .map_err(|e| AnalysisError::RasterisationFailed {
                    path: pdf.to_path_buf(),
                    page: page_num,
                    detail: format!("cannot write {}: {}", path.display(), e),
                })?;

            debug!("Rendered page {} → {}x{} px", page_num, w, h);
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_paths_are_one_indexed_under_stem() {
        let dir = PageDirs::new().claim(Path::new("out"), Path::new("in/Ledger 1903.PDF"));
        assert_eq!(dir, PathBuf::from("out/Ledger 1903"));
        assert_eq!(page_image_path(&dir, 1), PathBuf::from("out/Ledger 1903/page_1.jpg"));
        assert_eq!(page_image_path(&dir, 12), PathBuf::from("out/Ledger 1903/page_12.jpg"));
    }

    #[test]
    fn repeated_stems_get_their_own_folders() {
        let mut dirs = PageDirs::new();
        let out = Path::new("out");
        assert_eq!(dirs.claim(out, Path::new("in/scan.pdf")), PathBuf::from("out/scan"));
        assert_eq!(dirs.claim(out, Path::new("in/scan.PDF")), PathBuf::from("out/scan_2"));
        assert_eq!(dirs.claim(out, Path::new("in/Scan.Pdf")), PathBuf::from("out/Scan_3"));
        // A real `scan_2.pdf` arriving later must not reuse the generated folder.
        assert_eq!(dirs.claim(out, Path::new("in/scan_2.pdf")), PathBuf::from("out/scan_2_2"));
        assert_eq!(dirs.claim(out, Path::new("in/other.pdf")), PathBuf::from("out/other"));
    }

    #[test]
    fn render_size_follows_dpi() {
        // US Letter at 72 DPI is 612x792 pt → px.
        assert_eq!(render_size(612.0, 792.0, 72, 4000), (612, 792));
        // 200 DPI doubles-and-then-some.
        assert_eq!(render_size(612.0, 792.0, 200, 4000), (1700, 2200));
    }

    #[test]
    fn render_size_caps_longest_edge() {
        let (w, h) = render_size(2384.0, 3370.0, 200, 2000); // A0
        assert_eq!(h, 2000);
        assert!(w < 2000 && w > 1400, "w={w}");
    }
}
