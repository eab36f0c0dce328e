// SPDX-License-Identifier: GPL-3.0-only

//! Ring of kernel-shared mmap buffers
//!
//! Every buffer is either queued (owned by the driver) or owned by the
//! process. Dequeue moves queued → owned, requeue moves owned → queued.
//!
//! Teardown happens on drop: stream off if needed, unmap every region, then
//! release the kernel buffers with a zero-count request. A ring that failed
//! half-way through allocation is cleaned up the same way.

use super::types::DequeuedBuffer;
use super::{MappedRegion, SharedDevice};
use crate::constants::buffers;
use crate::errors::{DeviceError, DeviceResult, RingError};
use tracing::{debug, info, warn};

/// Ownership of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Handed to the driver, waiting to be filled
    Queued,
    /// Held by the process (before streaming, or between dequeue and requeue)
    Owned,
}

/// Mapped buffers for one streaming session of a device
pub struct BufferRing {
    device: SharedDevice,
    regions: Vec<Box<dyn MappedRegion>>,
    states: Vec<BufferState>,
    streaming: bool,
    released: bool,
}

impl BufferRing {
    /// Request `requested` buffers and map every granted one
    ///
    /// Fails with [`RingError::InsufficientBuffers`] when fewer than
    /// [`buffers::MIN_GRANTED`] are granted. On any failure nothing stays mapped.
    pub fn allocate(device: SharedDevice, requested: u32) -> Result<Self, RingError> {
        let granted = device.request_buffers(requested)?;
        debug!(device = %device.path(), requested, granted, "Buffers granted");

        let mut ring = Self {
            device,
            regions: Vec::with_capacity(granted as usize),
            states: Vec::with_capacity(granted as usize),
            streaming: false,
            released: false,
        };

        if granted < buffers::MIN_GRANTED {
            warn!(
                device = %ring.device.path(),
                requested,
                granted,
                "Driver granted too few buffers"
            );
            return Err(RingError::InsufficientBuffers { requested, granted });
        }

        for index in 0..granted {
            let location = ring.device.query_buffer(index)?;
            let region = ring.device.map_buffer(&location).inspect_err(|e| {
                warn!(
                    device = %ring.device.path(),
                    index,
                    error = %e,
                    "Failed to map buffer, unmapping earlier buffers"
                );
            })?;
            ring.regions.push(region);
            ring.states.push(BufferState::Owned);
        }

        info!(device = %ring.device.path(), count = granted, "Buffer ring allocated");
        Ok(ring)
    }

    /// Queue every buffer, then stream on
    pub fn start(&mut self) -> Result<(), RingError> {
        for index in 0..self.regions.len() {
            if self.states[index] == BufferState::Queued {
                continue;
            }
            self.device.queue_buffer(index as u32)?;
            self.states[index] = BufferState::Queued;
        }

        self.device.stream_on()?;
        self.streaming = true;
        debug!(device = %self.device.path(), "Streaming started");
        Ok(())
    }

    /// Stream off; failures are logged only
    ///
    /// Stream off returns every buffer to the process.
    pub fn stop(&mut self) {
        if let Err(e) = self.device.stream_off() {
            warn!(device = %self.device.path(), error = %e, "Failed to stop streaming");
        }
        self.streaming = false;
        self.states.fill(BufferState::Owned);
    }

    /// Take a completed buffer back from the driver
    ///
    /// `Ok(None)` when no buffer is ready yet.
    pub fn dequeue(&mut self) -> DeviceResult<Option<DequeuedBuffer>> {
        let Some(dequeued) = self.device.dequeue_buffer()? else {
            return Ok(None);
        };

        let index = dequeued.index as usize;
        match self.states.get_mut(index) {
            Some(state) => {
                if *state != BufferState::Queued {
                    warn!(device = %self.device.path(), index, "Dequeued a buffer that was not queued");
                }
                *state = BufferState::Owned;
                Ok(Some(dequeued))
            }
            None => Err(DeviceError::new("VIDIOC_DQBUF", libc::EINVAL)),
        }
    }

    /// Give an owned buffer back to the driver
    pub fn requeue(&mut self, index: u32) -> DeviceResult<()> {
        match self.states.get(index as usize) {
            Some(BufferState::Owned) => {}
            Some(BufferState::Queued) => {
                debug!(device = %self.device.path(), index, "Buffer already queued");
                return Ok(());
            }
            None => return Err(DeviceError::new("VIDIOC_QBUF", libc::EINVAL)),
        }

        self.device.queue_buffer(index)?;
        self.states[index as usize] = BufferState::Queued;
        Ok(())
    }

    /// Payload of an owned buffer, clamped to the bytes the driver filled
    pub fn payload(&self, dequeued: &DequeuedBuffer) -> Option<&[u8]> {
        let index = dequeued.index as usize;
        if self.states.get(index) != Some(&BufferState::Owned) {
            return None;
        }
        let bytes = self.regions[index].as_slice();
        Some(&bytes[..dequeued.bytes_used.min(bytes.len())])
    }

    /// Unmap every buffer and release them
    pub fn free(mut self) {
        self.release();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn state(&self, index: usize) -> Option<BufferState> {
        self.states.get(index).copied()
    }

    pub fn queued_count(&self) -> usize {
        self.states
            .iter()
            .filter(|state| **state == BufferState::Queued)
            .count()
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.streaming || self.queued_count() > 0 {
            self.stop();
        }

        let count = self.regions.len();
        self.regions.clear();
        self.states.clear();

        if let Err(e) = self.device.request_buffers(0) {
            debug!(device = %self.device.path(), error = %e, "Failed to release kernel buffers");
        }
        debug!(device = %self.device.path(), count, "Buffer ring freed");
    }
}

impl Drop for BufferRing {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BufferRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRing")
            .field("device", &self.device.path())
            .field("states", &self.states)
            .field("streaming", &self.streaming)
            .finish()
    }
}
