// SPDX-License-Identifier: GPL-3.0-only

//! camera-feed - V4L2 capture feeds
//!
//! This library discovers Video4Linux capture devices, negotiates formats
//! with them, streams through a ring of mmap buffers and decodes every
//! captured frame into a stable pixel format.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Device protocol, sessions, capture loop and discovery
//! - [`media`]: Encoding classification and frame decoders
//! - [`config`]: Capture configuration
//! - [`constants`]: Timing and sizing defaults
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! let mut session = DeviceSession::open("/dev/video0", SessionOptions::default(), events)?;
//! session.select_format(0, &FeedParameters::new())?;
//! session.activate()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;

// Re-export commonly used types
pub use backends::camera::{
    CaptureDevice, DeviceDiscovery, DeviceSession, FeedEvents, FeedParameters, OutputMode,
    SessionOptions,
};
pub use config::CaptureConfig;
pub use errors::{AppError, DeviceError, SessionError};
