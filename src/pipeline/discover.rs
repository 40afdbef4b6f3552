//! Input discovery: validate the input directory and list candidate files.
//!
//! Only the top level of the directory is scanned. Extension matching is
//! case-insensitive, so `SCAN_01.JPG` and `scan_01.jpg` are both found.
//! Results are sorted by path so two scans of an unchanged directory list
//! files in the same order.

use crate::error::AnalysisError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extensions treated as PDF documents.
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Extensions treated as directly supplied raster images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// PDFs and images found in one input directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredInputs {
    pub pdfs: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl DiscoveredInputs {
    pub fn is_empty(&self) -> bool {
        self.pdfs.is_empty() && self.images.is_empty()
    }
}

/// Validate that `path` exists and is a directory.
pub fn resolve_input_dir(path: &Path) -> Result<PathBuf, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(AnalysisError::InputNotADirectory {
            path: path.to_path_buf(),
        });
    }
    debug!("Resolved input directory: {}", path.display());
    Ok(path.to_path_buf())
}

/// Does `path` carry one of `extensions` (compared case-insensitively)?
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

/// List regular files directly inside `dir` whose extension is in `extensions`.
pub fn discover_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, AnalysisError> {
    let entries = std::fs::read_dir(dir).map_err(|e| AnalysisError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        warn!(
            "No files with extensions {:?} found in {}",
            extensions,
            dir.display()
        );
    } else {
        info!(
            "Found {} files with extensions {:?}",
            files.len(),
            extensions
        );
    }

    Ok(files)
}

/// Discover both PDFs and direct images in `dir`.
pub fn discover_inputs(dir: &Path) -> Result<DiscoveredInputs, AnalysisError> {
    Ok(DiscoveredInputs {
        pdfs: discover_files(dir, PDF_EXTENSIONS)?,
        images: discover_files(dir, IMAGE_EXTENSIONS)?,
    })
}
