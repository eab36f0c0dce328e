// SPDX-License-Identifier: GPL-3.0-only

//! JPEG / MJPEG frame decompression

use crate::backends::camera::types::{DecodedFrame, ImageFormat};
use crate::errors::DecodeError;

/// Decompress one JPEG frame into the primary RGB8 image
///
/// The output takes the dimensions stored in the JPEG stream. Nothing is
/// written unless decompression succeeds.
pub fn decode_into(raw: &[u8], out: &mut DecodedFrame) -> Result<(), DecodeError> {
    let decoded = image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)
        .map_err(|e| DecodeError::Jpeg(e.to_string()))?
        .to_rgb8();

    let (width, height) = decoded.dimensions();
    out.primary_mut(width, height, ImageFormat::Rgb8)
        .data
        .copy_from_slice(decoded.as_raw());
    out.chroma = None;
    Ok(())
}
