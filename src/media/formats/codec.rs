// SPDX-License-Identifier: GPL-3.0-only

//! Encoding classification for captured pixel formats

use std::fmt;
use v4l::FourCC;

/// Byte order of a packed YUV 4:2:2 encoding
///
/// Each 4-byte group carries two luma samples and one chroma pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedYuvLayout {
    /// Y0 U Y1 V
    Yuyv,
    /// Y0 Y1 U V
    Yyuv,
    /// Y0 V Y1 U
    Yvyu,
    /// U Y0 V Y1
    Uyvy,
    /// V Y0 U Y1
    Vyuy,
}

impl PackedYuvLayout {
    /// Byte offsets of `[y0, y1, cb, cr]` inside a 4-byte group
    pub const fn indexes(&self) -> [usize; 4] {
        match self {
            Self::Yyuv => [0, 1, 2, 3],
            Self::Yuyv => [0, 2, 1, 3],
            Self::Yvyu => [0, 2, 3, 1],
            Self::Uyvy => [1, 3, 0, 2],
            Self::Vyuy => [1, 3, 2, 0],
        }
    }

    pub fn fourcc(&self) -> FourCC {
        match self {
            Self::Yuyv => FourCC::new(b"YUYV"),
            Self::Yyuv => FourCC::new(b"YYUV"),
            Self::Yvyu => FourCC::new(b"YVYU"),
            Self::Uyvy => FourCC::new(b"UYVY"),
            Self::Vyuy => FourCC::new(b"VYUY"),
        }
    }
}

/// How an encoding is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Packed YUV 4:2:2 in the given byte order
    PackedYuv(PackedYuvLayout),
    /// Motion JPEG or plain JPEG frames
    Jpeg,
    /// Anything else, passed through untouched
    Raw,
}

impl Codec {
    /// Classify a V4L2 FourCC
    pub fn from_fourcc(fourcc: FourCC) -> Self {
        match &fourcc.repr {
            b"MJPG" | b"JPEG" => Self::Jpeg,
            b"YUYV" => Self::PackedYuv(PackedYuvLayout::Yuyv),
            b"YYUV" => Self::PackedYuv(PackedYuvLayout::Yyuv),
            b"YVYU" => Self::PackedYuv(PackedYuvLayout::Yvyu),
            b"UYVY" => Self::PackedYuv(PackedYuvLayout::Uyvy),
            b"VYUY" => Self::PackedYuv(PackedYuvLayout::Vyuy),
            _ => Self::Raw,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackedYuv(layout) => write!(f, "packed YUV 4:2:2 ({})", layout.fourcc()),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Raw => write!(f, "raw"),
        }
    }
}
