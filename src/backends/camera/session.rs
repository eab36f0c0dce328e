// SPDX-License-Identifier: GPL-3.0-only

//! Device session: one open capture device and its capture lifecycle
//!
//! A session holds one device handle for its whole lifetime. It builds the
//! format catalog at creation, negotiates the selected format, and on
//! activation sets up the buffer ring, the decoder and the capture loop.
//! Teardown always runs in the same order: join the loop, stream off,
//! unmap, release the kernel buffers.

use super::buffer_ring::BufferRing;
use super::capture::{CaptureLoop, CaptureWorker, LoopState};
use super::catalog;
use super::types::{
    DecodedFrame, DeviceIdentity, FeedParameters, FormatDescriptor, FrameInterval,
    NegotiatedFormat, OutputMode, OUTPUT_PARAMETER,
};
use super::v4l2_device::V4l2Device;
use super::{FeedEvents, SharedDevice};
use crate::config::CaptureConfig;
use crate::constants::{buffers, timing};
use crate::errors::{DeviceResult, SessionError, SessionResult};
use crate::media::{Codec, FrameDecoder, select_strategy};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session shared between discovery and feed consumers
pub type SharedSession = Arc<Mutex<DeviceSession>>;

/// Tunables applied to every session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Buffers requested from the driver on activation
    pub requested_buffers: u32,
    /// Sleep between dequeue attempts when no frame is ready
    pub poll_interval: Duration,
    /// Output mode used when the parameters carry no `"output"` option
    pub default_output: OutputMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            requested_buffers: buffers::REQUESTED_COUNT,
            poll_interval: timing::dequeue_poll(),
            default_output: OutputMode::default(),
        }
    }
}

impl From<&CaptureConfig> for SessionOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            requested_buffers: config.buffer_count,
            poll_interval: config.poll_interval(),
            default_output: config.output_mode,
        }
    }
}

/// Packed YUV is decoded as one unpadded run of 2x1 groups
fn check_row_layout(negotiated: &NegotiatedFormat) -> SessionResult<()> {
    if !matches!(Codec::from_fourcc(negotiated.encoding), Codec::PackedYuv(_)) {
        return Ok(());
    }
    let tight = negotiated.width * 2;
    let stride_ok = negotiated.bytes_per_line == 0 || negotiated.bytes_per_line == tight;
    if negotiated.width % 2 == 0 && stride_ok {
        Ok(())
    } else {
        Err(SessionError::UnsupportedRowLayout {
            width: negotiated.width,
            bytes_per_line: negotiated.bytes_per_line,
        })
    }
}

/// One capture device and everything needed to stream from it
pub struct DeviceSession {
    identity: DeviceIdentity,
    device: SharedDevice,
    options: SessionOptions,
    events: Arc<dyn FeedEvents>,
    formats: Vec<FormatDescriptor>,
    selected: Option<usize>,
    output_mode: OutputMode,
    negotiated: Option<NegotiatedFormat>,
    active: bool,
    capture: Option<CaptureLoop>,
    output: Arc<Mutex<DecodedFrame>>,
}

impl DeviceSession {
    /// Open a V4L2 node and create a session for it
    pub fn open(
        path: &str,
        options: SessionOptions,
        events: Arc<dyn FeedEvents>,
    ) -> DeviceResult<Self> {
        let device: SharedDevice = Arc::new(V4l2Device::open(path)?);
        Ok(Self::new(device, options, events))
    }

    /// Create a session over an already open device
    ///
    /// Queries the card name, builds the format catalog and applies the
    /// first format. A failure to apply it is only logged.
    pub fn new(device: SharedDevice, options: SessionOptions, events: Arc<dyn FeedEvents>) -> Self {
        let path = device.path().to_string();
        let name = match device.query_capability() {
            Ok(capability) if !capability.card.is_empty() => capability.card,
            Ok(_) => path.clone(),
            Err(e) => {
                warn!(device = %path, error = %e, "Failed to query card name");
                path.clone()
            }
        };

        let formats = catalog::enumerate(device.as_ref());

        let mut session = Self {
            identity: DeviceIdentity { path, name },
            device,
            options,
            events,
            formats,
            selected: None,
            output_mode: options.default_output,
            negotiated: None,
            active: false,
            capture: None,
            output: Arc::new(Mutex::new(DecodedFrame::default())),
        };

        if !session.formats.is_empty()
            && let Err(e) = session.select_format(0, &FeedParameters::new())
        {
            warn!(device = %session.identity.path, error = %e, "Failed to apply initial format");
        }

        info!(
            device = %session.identity.path,
            name = %session.identity.name,
            formats = session.formats.len(),
            "Device session created"
        );
        session
    }

    // ===== Identity =====

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn device_path(&self) -> &str {
        &self.identity.path
    }

    // ===== Formats =====

    /// The format catalog, in enumeration order
    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn selected_format(&self) -> Option<usize> {
        self.selected
    }

    /// What the driver applied for the current selection
    pub fn negotiated_format(&self) -> Option<NegotiatedFormat> {
        self.negotiated
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Select a catalog entry and push it to the device
    ///
    /// Fails while active. An out-of-range index leaves the selection
    /// untouched. A rejected frame rate keeps the applied format selected
    /// but is still reported.
    pub fn select_format(&mut self, index: usize, parameters: &FeedParameters) -> SessionResult<()> {
        if self.active {
            return Err(SessionError::AlreadyActive);
        }
        if index >= self.formats.len() {
            return Err(SessionError::FormatIndexOutOfRange {
                index,
                len: self.formats.len(),
            });
        }

        let output_mode = match parameters.get(OUTPUT_PARAMETER) {
            Some(value) => OutputMode::from_option(Some(value.as_str())),
            None => self.options.default_output,
        };

        let negotiated = self
            .device
            .set_format(
                self.formats[index].width,
                self.formats[index].height,
                self.formats[index].encoding,
            )
            .map_err(SessionError::Negotiation)?;

        self.selected = Some(index);
        self.output_mode = output_mode;
        self.negotiated = Some(negotiated);

        let descriptor = &self.formats[index];
        debug!(
            device = %self.identity.path,
            index,
            format = %descriptor,
            output = %output_mode,
            "Format selected"
        );

        if let Some(interval) = descriptor.frame_interval.filter(FrameInterval::is_specified)
            && let Err(e) = self.device.set_frame_interval(interval)
        {
            warn!(device = %self.identity.path, interval = %interval, error = %e, "Frame rate rejected");
            return Err(SessionError::FrameRate(e));
        }

        self.events.format_changed();
        Ok(())
    }

    // ===== Activation =====

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Capture loop state; stopped while active means the loop died
    pub fn capture_state(&self) -> LoopState {
        self.capture
            .as_ref()
            .map(|capture| capture.state())
            .unwrap_or(LoopState::Stopped)
    }

    /// The capture loop stopped on a fatal device error
    pub fn capture_failed(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|capture| capture.has_failed())
    }

    /// Start streaming the selected format
    pub fn activate(&mut self) -> SessionResult<()> {
        if self.active {
            return Err(SessionError::AlreadyActive);
        }
        let index = self.selected.ok_or(SessionError::NoFormatSelected)?;
        let descriptor = self.formats[index].clone();

        // Re-apply on the held handle; the driver may have been touched since
        let negotiated = self
            .device
            .set_format(descriptor.width, descriptor.height, descriptor.encoding)
            .map_err(SessionError::Negotiation)?;
        self.negotiated = Some(negotiated);

        if let Some(interval) = descriptor.frame_interval.filter(FrameInterval::is_specified)
            && let Err(e) = self.device.set_frame_interval(interval)
        {
            warn!(device = %self.identity.path, interval = %interval, error = %e, "Frame rate rejected");
        }

        if let Err(e) = check_row_layout(&negotiated) {
            warn!(device = %self.identity.path, error = %e, "Refusing to capture padded rows");
            return Err(e);
        }

        let mut ring = BufferRing::allocate(Arc::clone(&self.device), self.options.requested_buffers)
            .map_err(SessionError::Allocation)?;
        ring.start().map_err(SessionError::Streaming)?;

        let decoder = FrameDecoder::new(
            select_strategy(negotiated.encoding, self.output_mode),
            negotiated.width,
            negotiated.height,
        );
        info!(
            device = %self.identity.path,
            encoding = %negotiated.encoding,
            width = negotiated.width,
            height = negotiated.height,
            buffers = ring.len(),
            strategy = %decoder.strategy(),
            "Activating capture"
        );

        let worker = CaptureWorker {
            ring,
            decoder,
            output: Arc::clone(&self.output),
            events: Arc::clone(&self.events),
            poll_interval: self.options.poll_interval,
            failed: Arc::new(AtomicBool::new(false)),
            dequeued: Arc::new(AtomicU64::new(0)),
        };

        let capture = CaptureLoop::start(&self.thread_name(), worker)
            .map_err(|e| SessionError::Thread(e.to_string()))?;

        self.capture = Some(capture);
        self.active = true;
        self.events.format_changed();
        Ok(())
    }

    /// Stop streaming and release every buffer
    pub fn deactivate(&mut self) -> SessionResult<()> {
        if !self.active {
            return Err(SessionError::NotActive);
        }

        if let Some(mut capture) = self.capture.take()
            && let Some(mut ring) = capture.stop()
        {
            ring.stop();
            ring.free();
        }

        self.active = false;
        info!(device = %self.identity.path, "Capture deactivated");
        self.events.format_changed();
        Ok(())
    }

    // ===== Output =====

    /// Copy of the current decoded frame, if one was produced
    pub fn latest_frame(&self) -> Option<DecodedFrame> {
        let output = match self.output.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (!output.is_empty()).then(|| output.clone())
    }

    /// Number of frames decoded since the session was created
    pub fn frame_sequence(&self) -> u64 {
        match self.output.lock() {
            Ok(guard) => guard.sequence,
            Err(poisoned) => poisoned.into_inner().sequence,
        }
    }

    fn thread_name(&self) -> String {
        let node = self
            .identity
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&self.identity.path);
        format!("capture-{}", node)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.active {
            debug!(device = %self.identity.path, "Session dropped while active, deactivating");
            let _ = self.deactivate();
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.identity)
            .field("formats", &self.formats.len())
            .field("selected", &self.selected)
            .field("active", &self.active)
            .finish()
    }
}
