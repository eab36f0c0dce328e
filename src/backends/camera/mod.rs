// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   Feed consumer     │  ← frame_ready / format_changed
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   DeviceDiscovery   │  ← Periodic rescan, session registry
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    DeviceSession    │  ← Catalog, negotiation, activation
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureLoop + Ring  │  ← Dequeue, decode, requeue
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureDevice Trait │  ← Device protocol (V4L2 or mock)
//! └─────────────────────┘
//! ```

pub mod buffer_ring;
pub mod capture;
pub mod catalog;
pub mod frame_loop;
pub mod manager;
pub mod session;
pub mod types;
pub mod v4l2_device;

pub use buffer_ring::BufferRing;
pub use capture::{CaptureLoop, LoopState};
pub use manager::{DeviceDiscovery, DiscoveryListener, NoopListener, RescanSummary};
pub use session::{DeviceSession, SessionOptions, SharedSession};
pub use types::*;
pub use v4l2_device::{V4l2Device, V4l2Provider};

use crate::errors::DeviceResult;
use std::sync::Arc;
use v4l::FourCC;

/// Device memory mapped into the process
///
/// Dropping the region unmaps it.
pub trait MappedRegion: Send {
    /// The whole mapped region
    fn as_slice(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Device-protocol boundary
///
/// Mirrors the V4L2 calls the pipeline needs. Every failure carries the raw
/// errno; a would-block dequeue is reported as `Ok(None)` instead.
pub trait CaptureDevice: Send + Sync {
    /// Device node path
    fn path(&self) -> &str;

    // ===== Discovery =====

    /// Query driver, card and capability flags
    fn query_capability(&self) -> DeviceResult<DeviceCapability>;

    /// Current format, used to verify the device can actually capture
    fn get_format(&self) -> DeviceResult<NegotiatedFormat>;

    // ===== Enumeration =====

    /// Encoding at `index`; an error ends the enumeration
    fn enum_format(&self, index: u32) -> DeviceResult<EncodingInfo>;

    /// Discrete frame size at `index` for an encoding
    fn enum_frame_size(&self, encoding: FourCC, index: u32) -> DeviceResult<(u32, u32)>;

    /// Discrete frame interval at `index` for an encoding and size
    fn enum_frame_interval(
        &self,
        encoding: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> DeviceResult<FrameInterval>;

    // ===== Negotiation =====

    /// Push a format; returns what the driver actually applied
    fn set_format(&self, width: u32, height: u32, encoding: FourCC)
    -> DeviceResult<NegotiatedFormat>;

    /// Push a frame-rate request
    fn set_frame_interval(&self, interval: FrameInterval) -> DeviceResult<()>;

    // ===== Buffers =====

    /// Request `count` mmap buffers; returns the granted count
    fn request_buffers(&self, count: u32) -> DeviceResult<u32>;

    /// Length and mmap offset of a granted buffer
    fn query_buffer(&self, index: u32) -> DeviceResult<BufferLocation>;

    /// Map a granted buffer into process memory
    fn map_buffer(&self, location: &BufferLocation) -> DeviceResult<Box<dyn MappedRegion>>;

    /// Hand a buffer to the driver
    fn queue_buffer(&self, index: u32) -> DeviceResult<()>;

    /// Take a completed buffer back; `Ok(None)` when none is ready yet
    fn dequeue_buffer(&self) -> DeviceResult<Option<DequeuedBuffer>>;

    // ===== Streaming =====

    fn stream_on(&self) -> DeviceResult<()>;

    fn stream_off(&self) -> DeviceResult<()>;
}

/// Capture device shared between a session and its capture thread
pub type SharedDevice = Arc<dyn CaptureDevice>;

/// Source of candidate device nodes for discovery
pub trait DeviceProvider: Send + Sync {
    /// Candidate device paths currently present
    fn scan(&self) -> Vec<String>;

    /// Open a candidate
    fn open(&self, path: &str) -> DeviceResult<SharedDevice>;
}

/// Outward notifications of a feed
///
/// Both are payload-free; consumers read the session's current output.
pub trait FeedEvents: Send + Sync {
    /// A new decoded frame is available
    fn frame_ready(&self);

    /// Activation state or format changed
    fn format_changed(&self);
}

/// Events sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl FeedEvents for NoopEvents {
    fn frame_ready(&self) {}

    fn format_changed(&self) {}
}
