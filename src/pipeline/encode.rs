//! Image encoding: decoded page → downscaled, optionally grey, size-capped JPEG.
//!
//! Phone cameras produce 12–48 MP photos, far beyond what an OCR model needs
//! and far beyond the backend's 9.5 MiB upload ceiling. Each page is:
//!
//! 1. scaled so its longest edge is at most `max_dimension_px` (never up),
//! 2. optionally converted to luma, which helps on tinted paper,
//! 3. JPEG-encoded at the qualities in [`QUALITY_STEPS`], keeping the first
//!    result under the ceiling.
//!
//! The search only walks down the quality ladder. Dimensions are fixed once
//! computed; if even the lowest quality is too large the lowest-quality
//! output is returned anyway and flagged with `fits_ceiling = false`.

use crate::config::{NormalizationOptions, QUALITY_STEPS};
use crate::error::ItemError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// A normalised, encoded page ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// JPEG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// JPEG quality (1–100) of the returned bytes.
    pub quality: u8,
    /// Whether `bytes.len()` is within the configured ceiling.
    pub fits_ceiling: bool,
}

/// Target dimensions for a `width × height` image capped at `max_side`.
///
/// `scale = min(1, max_side / max(w, h))`, each side rounded and at least 1.
pub fn target_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest == 0 || longest <= max_side {
        return (width.max(1), height.max(1));
    }
    let scale = max_side as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Replace RGB with `Y = 0.299R + 0.587G + 0.114B` in place. Alpha is kept.
pub fn apply_luma(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let y = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
        pixel.0[0] = y;
        pixel.0[1] = y;
        pixel.0[2] = y;
    }
}

/// Encode an RGB raster as JPEG at `quality`.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Downscale, optionally desaturate, and encode under the upload ceiling.
///
/// `name` is only used for error reporting.
pub fn compress(
    name: &str,
    img: &DynamicImage,
    options: &NormalizationOptions,
) -> Result<EncodedImage, ItemError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ItemError::CanvasUnavailable {
            name: name.to_string(),
            detail: format!("image has zero size ({width}x{height})"),
        });
    }

    let (tw, th) = target_dimensions(width, height, options.max_dimension_px);
    let mut canvas: RgbaImage = if (tw, th) == (width, height) {
        img.to_rgba8()
    } else {
        image::imageops::resize(&img.to_rgba8(), tw, th, FilterType::Lanczos3)
    };
    debug!("'{}': {}x{} → {}x{}", name, width, height, tw, th);

    if options.grayscale {
        apply_luma(&mut canvas);
    }

    let rendered = DynamicImage::ImageRgba8(canvas);
    let mut last: Option<(u8, Vec<u8>)> = None;

    for &quality in QUALITY_STEPS.iter() {
        let bytes = encode_jpeg(&rendered, quality).map_err(|e| ItemError::EncodeFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
        debug!("'{}': quality {} → {} bytes", name, quality, bytes.len());

        if bytes.len() <= options.max_upload_bytes {
            return Ok(EncodedImage {
                bytes,
                width: tw,
                height: th,
                quality,
                fits_ceiling: true,
            });
        }
        last = Some((quality, bytes));
    }

    let (quality, bytes) = last.ok_or_else(|| ItemError::EncodeFailed {
        name: name.to_string(),
        detail: "no quality levels configured".to_string(),
    })?;
    debug!(
        "'{}': still {} bytes at quality {}, over the {} byte ceiling",
        name,
        bytes.len(),
        quality,
        options.max_upload_bytes
    );
    Ok(EncodedImage {
        bytes,
        width: tw,
        height: th,
        quality,
        fits_ceiling: false,
    })
}

/// Decode bytes into an upright raster.
///
/// Phone photos are usually stored sideways with an EXIF Orientation tag;
/// the tag is applied here so pages reach OCR the way they are displayed.
pub fn decode(name: &str, bytes: &[u8]) -> Result<DynamicImage, ItemError> {
    let fail = |detail: String| ItemError::DecodeFailed {
        name: name.to_string(),
        detail,
    };

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| fail(e.to_string()))?
        .into_decoder()
        .map_err(|e| fail(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| fail(e.to_string()))?;
    if orientation != Orientation::NoTransforms {
        debug!("'{}': applying EXIF orientation {:?}", name, orientation);
        img.apply_orientation(orientation);
    }
    Ok(img)
}

/// Decode and compress on the blocking pool; both steps are CPU-bound.
pub async fn decode_and_compress(
    name: String,
    bytes: Vec<u8>,
    options: NormalizationOptions,
) -> Result<EncodedImage, ItemError> {
    let task_name = name.clone();
    tokio::task::spawn_blocking(move || {
        let img = decode(&task_name, &bytes)?;
        compress(&task_name, &img, &options)
    })
    .await
    .map_err(|e| ItemError::EncodeFailed {
        name,
        detail: format!("encode task panicked: {e}"),
    })?
}
