// SPDX-License-Identifier: GPL-3.0-only

//! Frame decoder strategies
//!
//! A strategy is picked once per activation from the negotiated encoding and
//! the requested output mode. Decoding overwrites the session's single
//! [`DecodedFrame`] in place and never touches the device.

mod jpeg;

use crate::backends::camera::types::{DecodedFrame, FrameImage, ImageFormat, OutputMode};
use crate::errors::DecodeError;
use crate::media::formats::conversions::{
    packed_len, packed_to_luma, packed_to_planes, packed_to_rgb,
};
use crate::media::formats::{Codec, PackedYuvLayout};
use std::fmt;
use v4l::FourCC;

/// The six ways a captured buffer can be turned into pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStrategy {
    /// Luma plane (L8) plus half-width chroma pair plane (RG8)
    SplitPlanes(PackedYuvLayout),
    /// Luma plane only (L8)
    Grayscale(PackedYuvLayout),
    /// Packed bytes copied verbatim, tagged LA8
    PackedCopy,
    /// Fixed-point BT.601 conversion to RGB8
    PackedToRgb(PackedYuvLayout),
    /// JPEG decompression to RGB8
    Jpeg,
    /// Unknown encoding copied verbatim, tagged RGBA8
    RawCopy,
}

impl fmt::Display for DecoderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitPlanes(layout) => write!(f, "split planes ({})", layout.fourcc()),
            Self::Grayscale(layout) => write!(f, "grayscale ({})", layout.fourcc()),
            Self::PackedCopy => write!(f, "packed copy"),
            Self::PackedToRgb(layout) => write!(f, "RGB ({})", layout.fourcc()),
            Self::Jpeg => write!(f, "JPEG"),
            Self::RawCopy => write!(f, "raw copy"),
        }
    }
}

/// Pick a strategy; compressed and unknown encodings ignore the output mode
pub fn select_strategy(encoding: FourCC, mode: OutputMode) -> DecoderStrategy {
    match Codec::from_fourcc(encoding) {
        Codec::Jpeg => DecoderStrategy::Jpeg,
        Codec::PackedYuv(layout) => match mode {
            OutputMode::Separate => DecoderStrategy::SplitPlanes(layout),
            OutputMode::Grayscale => DecoderStrategy::Grayscale(layout),
            OutputMode::Copy => DecoderStrategy::PackedCopy,
            OutputMode::Rgb => DecoderStrategy::PackedToRgb(layout),
        },
        Codec::Raw => DecoderStrategy::RawCopy,
    }
}

/// Decoder bound to one negotiated frame size
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    strategy: DecoderStrategy,
    width: u32,
    height: u32,
}

impl FrameDecoder {
    pub fn new(strategy: DecoderStrategy, width: u32, height: u32) -> Self {
        Self {
            strategy,
            width,
            height,
        }
    }

    pub fn strategy(&self) -> DecoderStrategy {
        self.strategy
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn require(&self, raw: &[u8], expected: usize) -> Result<(), DecodeError> {
        if raw.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: raw.len(),
            });
        }
        Ok(())
    }

    /// Decode one captured payload into `out`
    ///
    /// On error `out` is left exactly as it was. On success the frame
    /// sequence is bumped.
    pub fn decode(&self, raw: &[u8], out: &mut DecodedFrame) -> Result<(), DecodeError> {
        let (width, height) = (self.width, self.height);
        let packed = packed_len(self.pixel_count());

        match self.strategy {
            DecoderStrategy::SplitPlanes(layout) => {
                self.require(raw, packed)?;
                // Take the planes out so both can be borrowed mutably
                let mut luma = out.primary.take();
                let mut chroma = out.chroma.take();
                let luma_image = ensure_image(&mut luma, width, height, ImageFormat::L8);
                let chroma_image = ensure_image(&mut chroma, width / 2, height, ImageFormat::Rg8);
                packed_to_planes(raw, layout, &mut luma_image.data, &mut chroma_image.data);
                out.primary = luma;
                out.chroma = chroma;
            }
            DecoderStrategy::Grayscale(layout) => {
                self.require(raw, packed)?;
                let luma = out.primary_mut(width, height, ImageFormat::L8);
                packed_to_luma(raw, layout, &mut luma.data);
                out.chroma = None;
            }
            DecoderStrategy::PackedCopy => {
                self.require(raw, packed)?;
                let image = out.primary_mut(width, height, ImageFormat::La8);
                image.data.copy_from_slice(&raw[..packed]);
                out.chroma = None;
            }
            DecoderStrategy::PackedToRgb(layout) => {
                self.require(raw, packed)?;
                let rgb = out.primary_mut(width, height, ImageFormat::Rgb8);
                packed_to_rgb(raw, layout, &mut rgb.data);
                out.chroma = None;
            }
            DecoderStrategy::Jpeg => jpeg::decode_into(raw, out)?,
            DecoderStrategy::RawCopy => {
                self.require(raw, 1)?;
                let image = out.primary_mut(width, height, ImageFormat::Rgba8);
                let len = raw.len().min(image.data.len());
                image.data[..len].copy_from_slice(&raw[..len]);
                out.chroma = None;
            }
        }

        out.sequence += 1;
        Ok(())
    }
}

fn ensure_image(
    slot: &mut Option<FrameImage>,
    width: u32,
    height: u32,
    format: ImageFormat,
) -> &mut FrameImage {
    let image = slot.get_or_insert_with(|| FrameImage::new(width, height, format));
    image.ensure(width, height, format);
    image
}
