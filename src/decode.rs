use std::io::Cursor;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::{ImageReader, Limits, RgbImage};

use crate::error::DecodeError;

/// Standard alphabet, padding optional. Browsers always pad, hand-built
/// payloads often don't.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Drops a `data:image/...;base64,` header if present.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    }
}

/// Decodes a base64 payload into raw image bytes.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(PAYLOAD_ENGINE.decode(body.as_bytes())?)
}

/// Bounds applied while decoding one image. The header is checked before
/// any pixel buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_alloc: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: 8192,
            max_height: 8192,
            max_alloc: 256 * 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

/// Decodes a base64 (optionally data-URI prefixed) image into an RGB pixel grid
/// under the default limits.
pub fn decode_image(payload: &str) -> Result<RgbImage, DecodeError> {
    decode_image_with_limits(payload, &DecodeLimits::default())
}

/// Alpha is dropped and grayscale is expanded to three channels. Images over
/// `limits` fail with `DecodeError::Image`.
pub fn decode_image_with_limits(
    payload: &str,
    limits: &DecodeLimits,
) -> Result<RgbImage, DecodeError> {
    let bytes = decode_base64(payload)?;
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits.to_image_limits());
    let img = reader.decode()?.into_rgb8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSize { width, height });
    }
    Ok(img)
}
