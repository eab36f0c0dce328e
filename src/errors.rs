// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture pipeline

use std::fmt;

/// Result type alias for single device-protocol calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for the command-line layer
pub type AppResult<T> = Result<T, AppError>;

/// One failed device-protocol call
///
/// The code is the raw errno reported by the kernel; it is only used for
/// logging, except for would-block which the capture loop treats as "no frame yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    /// Name of the failed operation (e.g. "VIDIOC_DQBUF")
    pub op: &'static str,
    /// Raw errno
    pub code: i32,
}

impl DeviceError {
    pub fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }

    /// Keep the errno of a failed v4l call
    pub fn from_io(op: &'static str, error: std::io::Error) -> Self {
        let code = error.raw_os_error().unwrap_or(libc::EIO);
        Self { op, code }
    }

    pub fn is_would_block(&self) -> bool {
        self.code == libc::EAGAIN || self.code == libc::EWOULDBLOCK
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {} (errno {})",
            self.op,
            std::io::Error::from_raw_os_error(self.code),
            self.code
        )
    }
}

impl std::error::Error for DeviceError {}

/// Buffer ring errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// A device call failed while setting up or driving the ring
    Device(DeviceError),
    /// The driver granted fewer buffers than the ring can stream with
    InsufficientBuffers { requested: u32, granted: u32 },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::Device(e) => write!(f, "Buffer ring device error: {}", e),
            RingError::InsufficientBuffers { requested, granted } => write!(
                f,
                "Insufficient buffers: requested {}, granted {}",
                requested, granted
            ),
        }
    }
}

impl std::error::Error for RingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RingError::Device(e) => Some(e),
            RingError::InsufficientBuffers { .. } => None,
        }
    }
}

impl From<DeviceError> for RingError {
    fn from(e: DeviceError) -> Self {
        RingError::Device(e)
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The captured payload is shorter than the negotiated frame needs
    Truncated { expected: usize, actual: usize },
    /// Compressed payload could not be decompressed
    Jpeg(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { expected, actual } => write!(
                f,
                "Truncated frame: expected {} bytes, got {}",
                expected, actual
            ),
            DecodeError::Jpeg(msg) => write!(f, "JPEG decode failed: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Device session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Selected index is past the end of the format catalog
    FormatIndexOutOfRange { index: usize, len: usize },
    /// Activation requested without a selected format
    NoFormatSelected,
    /// Operation not allowed while capturing
    AlreadyActive,
    /// Operation requires an active session
    NotActive,
    /// The driver rejected the format
    Negotiation(DeviceError),
    /// The format was applied but the frame rate was rejected
    FrameRate(DeviceError),
    /// Packed rows are padded or the width is odd
    UnsupportedRowLayout { width: u32, bytes_per_line: u32 },
    /// Buffer ring allocation failed
    Allocation(RingError),
    /// Queueing buffers or stream-on failed
    Streaming(RingError),
    /// The capture thread could not be spawned
    Thread(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::FormatIndexOutOfRange { index, len } => write!(
                f,
                "Format index {} out of range (catalog has {} formats)",
                index, len
            ),
            SessionError::NoFormatSelected => write!(f, "No format selected"),
            SessionError::AlreadyActive => write!(f, "Session is already active"),
            SessionError::NotActive => write!(f, "Session is not active"),
            SessionError::Negotiation(e) => write!(f, "Format negotiation failed: {}", e),
            SessionError::FrameRate(e) => write!(f, "Frame rate request failed: {}", e),
            SessionError::UnsupportedRowLayout {
                width,
                bytes_per_line,
            } => write!(
                f,
                "Unsupported row layout: {} bytes per line for width {}",
                bytes_per_line, width
            ),
            SessionError::Allocation(e) => write!(f, "Buffer allocation failed: {}", e),
            SessionError::Streaming(e) => write!(f, "Failed to start streaming: {}", e),
            SessionError::Thread(msg) => write!(f, "Capture thread error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Negotiation(e) | SessionError::FrameRate(e) => Some(e),
            SessionError::Allocation(e) | SessionError::Streaming(e) => Some(e),
            _ => None,
        }
    }
}

/// Command-line layer errors
#[derive(Debug)]
pub enum AppError {
    /// Session-level failure
    Session(SessionError),
    /// Configuration file could not be read or parsed
    Config(String),
    /// Filesystem or other I/O failure
    Io(std::io::Error),
    /// Saving a decoded image failed
    Image(String),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Session(e) => write!(f, "Session error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(e) => write!(f, "I/O error: {}", e),
            AppError::Image(msg) => write!(f, "Image error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Session(e) => Some(e),
            AppError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(e: image::ImageError) -> Self {
        AppError::Image(e.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}
