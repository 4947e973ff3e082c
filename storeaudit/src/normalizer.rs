//! Bounded-size JPEG encodings of a captured photo.
//!
//! Two independent forms are produced from the same decoded image: a transport form sent to
//! the inference service and a smaller archive form kept as audit evidence. Neither mutates
//! the caller's image.

use std::borrow::Cow;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;

use crate::config::NormalizerConfig;

/// MIME type of both encoded forms.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("photo could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("photo could not be encoded as JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    max_edge: u32,
    transport_quality: u8,
    archive_quality: u8,
}

impl ImageNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            max_edge: config.max_edge.max(1),
            transport_quality: config.transport_quality,
            archive_quality: config.archive_quality,
        }
    }

    pub fn max_edge(&self) -> u32 {
        self.max_edge
    }

    /// Decode raw upload bytes (JPEG, PNG or WebP).
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
        image::load_from_memory(bytes).map_err(NormalizeError::Decode)
    }

    /// Encoding sent to the inference service.
    pub fn to_transport_form(&self, image: &DynamicImage) -> Result<Vec<u8>, NormalizeError> {
        encode_jpeg(&self.bounded(image), self.transport_quality)
    }

    /// Encoding kept as audit evidence. Same bound, lower quality.
    pub fn to_archive_form(&self, image: &DynamicImage) -> Result<Vec<u8>, NormalizeError> {
        encode_jpeg(&self.bounded(image), self.archive_quality)
    }

    fn bounded<'a>(&self, image: &'a DynamicImage) -> Cow<'a, DynamicImage> {
        let (width, height) = (image.width(), image.height());
        let (target_width, target_height) = bounded_dimensions(width, height, self.max_edge);

        if (target_width, target_height) == (width, height) {
            return Cow::Borrowed(image);
        }

        tracing::trace!(width, height, target_width, target_height, "Downscaling photo");
        Cow::Owned(image.resize_exact(target_width, target_height, FilterType::CatmullRom))
    }
}

/// Dimensions with the longer edge capped at `max_edge`, aspect ratio preserved.
///
/// Images already within the bound are returned unchanged. Neither edge collapses below 1.
pub fn bounded_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let max_edge = max_edge.max(1);
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let scale = |short: u32, long: u32| -> u32 {
        let (short, long, bound) = (short as u64, long as u64, max_edge as u64);
        // round half up; never exceeds `bound` because short <= long
        (((short * bound) + long / 2) / long).max(1) as u32
    };

    if width >= height {
        (max_edge, scale(height, width))
    } else {
        (scale(width, height), max_edge)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(NormalizeError::Encode)?;
    Ok(out)
}
