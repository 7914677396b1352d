//! Publish-precondition re-encode: RGB JPEG within a bounded width.

use bytes::Bytes;
use image::GenericImageView;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RecodeBudget {
    pub max_width: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Error)]
pub enum RecodeError {
    #[error("payload is not a decodable image: {0}")]
    Decode(String),
    #[error("re-encode failed: {0}")]
    Encode(String),
}

/// Convert an arbitrary image payload into an RGB JPEG no wider than the
/// budget allows, at the budget's fixed quality.
pub fn recode_for_publish(payload: &Bytes, budget: &RecodeBudget) -> Result<Bytes, RecodeError> {
    // Cheap header sniff before the full decode, for the log line only.
    if let Ok(dimensions) = imagesize::blob_size(payload) {
        debug!(
            target = "infra::image_ops",
            width = dimensions.width,
            height = dimensions.height,
            max_width = budget.max_width,
            "re-encoding image for publish"
        );
    }

    let decoded =
        image::load_from_memory(payload).map_err(|err| RecodeError::Decode(err.to_string()))?;

    let resized = if decoded.width() > budget.max_width {
        let scaled_height = ((u64::from(decoded.height()) * u64::from(budget.max_width))
            / u64::from(decoded.width()))
        .max(1) as u32;
        decoded.resize(budget.max_width, scaled_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, budget.jpeg_quality);
    encoder
        .encode_image(&rgb)
        .map_err(|err| RecodeError::Encode(err.to_string()))?;
    Ok(Bytes::from(output))
}
