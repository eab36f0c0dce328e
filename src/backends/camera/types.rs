// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture pipeline

//! Shared types for capture devices, format catalogs and decoded frames

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use v4l::FourCC;

/// Opaque key-value configuration handed over by the feed consumer
///
/// Only the `"output"` key is interpreted (see [`OutputMode`]).
pub type FeedParameters = HashMap<String, String>;

/// Key of the output mode option inside [`FeedParameters`]
pub const OUTPUT_PARAMETER: &str = "output";

/// Identity of a capture device, immutable once the session exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device node path (e.g., /dev/video0)
    pub path: String,
    /// Card name reported by the driver
    pub name: String,
}

/// Subset of the capability query the pipeline cares about
#[derive(Debug, Clone, Default)]
pub struct DeviceCapability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Effective capability flags (device_caps when the driver fills it in)
    pub capabilities: u32,
}

impl DeviceCapability {
    /// Single-planar video capture
    pub const VIDEO_CAPTURE: u32 = 0x0000_0001;
    /// Streaming I/O (mmap buffers)
    pub const STREAMING: u32 = 0x0400_0000;

    pub fn is_video_capture(&self) -> bool {
        self.capabilities & Self::VIDEO_CAPTURE != 0
    }

    pub fn supports_streaming(&self) -> bool {
        self.capabilities & Self::STREAMING != 0
    }
}

/// One entry of the encoding enumeration
#[derive(Debug, Clone)]
pub struct EncodingInfo {
    pub fourcc: FourCC,
    pub description: String,
}

/// Frame interval as a fraction of seconds (1/30 means 30fps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInterval {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameInterval {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A zero numerator or denominator carries no usable rate
    pub fn is_specified(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Frames per second, if the interval is specified
    pub fn fps(&self) -> Option<f64> {
        self.is_specified()
            .then(|| self.denominator as f64 / self.numerator as f64)
    }
}

impl std::fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// A supported (resolution, encoding, frame interval) tuple
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
    pub width: u32,
    pub height: u32,
    /// Wire encoding, only interpreted by the decoder selector
    pub encoding: FourCC,
    /// Human-readable encoding description from the driver
    pub description: String,
    /// `None` means unspecified (device default)
    pub frame_interval: Option<FrameInterval>,
}

impl std::fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}x{}", self.encoding, self.width, self.height)?;
        match self.frame_interval.and_then(|interval| interval.fps()) {
            Some(fps) => write!(f, " @ {:.2}fps", fps),
            None => Ok(()),
        }
    }
}

/// Format as accepted (and possibly adjusted) by the driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub encoding: FourCC,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

/// Where a granted buffer lives inside the device's mmap space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLocation {
    pub index: u32,
    pub length: usize,
    pub offset: u32,
}

/// A completed buffer handed back by a dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    /// Payload size; the decoder must not read past it
    pub bytes_used: usize,
    pub sequence: u32,
}

/// Output mode requested through the `"output"` feed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Luma plane plus interleaved chroma plane
    Separate,
    /// Luma only
    Grayscale,
    /// Raw bytes, no conversion
    Copy,
    /// Converted to interleaved RGB
    #[default]
    Rgb,
}

impl OutputMode {
    /// Parse an option value; anything unrecognized means RGB
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            Some("separate") => Self::Separate,
            Some("grayscale") => Self::Grayscale,
            Some("copy") => Self::Copy,
            _ => Self::Rgb,
        }
    }

    pub fn from_parameters(parameters: &FeedParameters) -> Self {
        Self::from_option(parameters.get(OUTPUT_PARAMETER).map(String::as_str))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Separate => "separate",
            Self::Grayscale => "grayscale",
            Self::Copy => "copy",
            Self::Rgb => "rgb",
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel layout of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8-bit luma
    L8,
    /// Luma + alpha (packed 4:2:2 bytes copied verbatim)
    La8,
    /// Two interleaved 8-bit channels (Cb, Cr)
    Rg8,
    /// Interleaved RGB, 3 bytes per pixel
    Rgb8,
    /// Interleaved RGBA, 4 bytes per pixel
    Rgba8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::L8 => 1,
            Self::La8 | Self::Rg8 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// One destination pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        let mut image = Self {
            width: 0,
            height: 0,
            format,
            data: Vec::new(),
        };
        image.ensure(width, height, format);
        image
    }

    /// Resize the backing storage only when the geometry or format changed
    pub fn ensure(&mut self, width: u32, height: u32, format: ImageFormat) {
        if self.width == width && self.height == height && self.format == format {
            return;
        }
        self.width = width;
        self.height = height;
        self.format = format;
        self.data
            .resize(width as usize * height as usize * format.bytes_per_pixel(), 0);
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// The single decoded frame retained per session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Main image (RGB, luma, raw copy)
    pub primary: Option<FrameImage>,
    /// Chroma plane for the split-planes strategy
    pub chroma: Option<FrameImage>,
    /// Incremented after every successful decode
    pub sequence: u64,
}

impl DecodedFrame {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
    }

    /// Mutable access to the primary image, allocated on first use
    pub fn primary_mut(&mut self, width: u32, height: u32, format: ImageFormat) -> &mut FrameImage {
        let image = self
            .primary
            .get_or_insert_with(|| FrameImage::new(width, height, format));
        image.ensure(width, height, format);
        image
    }
}
