//! Image encoding: image file → downscaled JPEG → base64 `EncodedImage`.
//!
//! Chat-completion APIs accept images as base64 data URIs embedded in the
//! JSON request body. Every sampled image is normalised to RGB JPEG so the
//! request carries a single MIME type, and the longer edge is capped so the
//! request size stays bounded no matter how large the scans are. Nothing is
//! written back to disk.

use crate::error::EncodeError;
use crate::output::ImageInfo;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// MIME type of every [`EncodedImage`].
pub const TRANSPORT_MIME: &str = "image/jpeg";

/// A sampled image ready to be embedded in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Path of the source image.
    pub path: PathBuf,
    /// Base64 (standard alphabet, padded) of the JPEG bytes.
    pub data: String,
    /// Pixel width after resizing.
    pub width: u32,
    /// Pixel height after resizing.
    pub height: u32,
}

impl EncodedImage {
    /// `data:image/jpeg;base64,…` URL for the `image_url` content part.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", TRANSPORT_MIME, self.data)
    }
}

/// Target size for an image of `width`×`height` whose longer edge must not
/// exceed `max_dimension`. The longer edge becomes exactly `max_dimension`;
/// the shorter one is scaled by the same ratio, truncated, and never below 1.
pub fn resize_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = |v: u32| ((v as u64 * max_dimension as u64 / longest as u64) as u32).max(1);
    if width >= height {
        (max_dimension, scale(height))
    } else {
        (scale(width), max_dimension)
    }
}

/// Downscale `img` so its longer edge is at most `max_dimension`.
pub fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let (nw, nh) = resize_dimensions(w, h, max_dimension);
    if (nw, nh) == (w, h) {
        return img;
    }
    debug!("Resizing {}x{} → {}x{}", w, h, nw, nh);
    img.resize_exact(nw, nh, FilterType::Lanczos3)
}

/// Open, downscale, and JPEG/base64-encode the image at `path`.
pub fn encode_image(
    path: &Path,
    max_dimension: u32,
    quality: u8,
) -> Result<EncodedImage, EncodeError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| EncodeError::Open {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let img = reader.decode().map_err(|e| EncodeError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let rgb = DynamicImage::ImageRgb8(downscale(img, max_dimension).into_rgb8());

    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| EncodeError::Encode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {} → {}x{}, {} bytes base64",
        path.display(),
        rgb.width(),
        rgb.height(),
        data.len()
    );

    Ok(EncodedImage {
        path: path.to_path_buf(),
        data,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Read dimensions and container format from the image header only.
pub fn inspect_image(path: &Path) -> Result<ImageInfo, EncodeError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| EncodeError::Open {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let format = reader.format().map(|f| format!("{f:?}"));
    let (width, height) = reader.into_dimensions().map_err(|e| EncodeError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(ImageInfo {
        path: path.to_path_buf(),
        width,
        height,
        format,
    })
}
