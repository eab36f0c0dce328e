// SPDX-License-Identifier: GPL-3.0-only

//! Per-device capture loop
//!
//! The loop thread owns the buffer ring and decoder while it runs. Each
//! iteration dequeues one buffer, decodes it into the shared output,
//! requeues the same index and announces the frame, even when decoding failed. Joining the loop hands
//! the ring back so it can be stopped and freed.

use super::buffer_ring::BufferRing;
use super::frame_loop::{LoopAction, LoopController};
use super::types::DecodedFrame;
use super::FeedEvents;
use crate::media::FrameDecoder;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Capture loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

/// Everything the capture thread owns while running
pub struct CaptureWorker {
    pub ring: BufferRing,
    pub decoder: FrameDecoder,
    pub output: Arc<Mutex<DecodedFrame>>,
    pub events: Arc<dyn FeedEvents>,
    pub poll_interval: Duration,
    /// Set when a dequeue fails with anything but would-block
    pub failed: Arc<AtomicBool>,
    /// Successful dequeues, for diagnostics
    pub dequeued: Arc<AtomicU64>,
}

/// One iteration of the capture loop
pub fn capture_step(worker: &mut CaptureWorker) -> LoopAction {
    let dequeued = match worker.ring.dequeue() {
        Ok(Some(dequeued)) => dequeued,
        Ok(None) => return LoopAction::Wait(worker.poll_interval),
        Err(e) => {
            error!(
                device = %worker.ring.device().path(),
                error = %e,
                "Dequeue failed, stopping capture"
            );
            worker.failed.store(true, Ordering::SeqCst);
            return LoopAction::Stop;
        }
    };
    worker.dequeued.fetch_add(1, Ordering::Relaxed);

    match worker.ring.payload(&dequeued) {
        Some(payload) => {
            let mut output = match worker.output.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = worker.decoder.decode(payload, &mut output) {
                warn!(
                    device = %worker.ring.device().path(),
                    index = dequeued.index,
                    error = %e,
                    "Failed to decode frame"
                );
            }
        }
        None => warn!(index = dequeued.index, "Dequeued buffer is not readable"),
    }

    if let Err(e) = worker.ring.requeue(dequeued.index) {
        warn!(
            device = %worker.ring.device().path(),
            index = dequeued.index,
            error = %e,
            "Failed to requeue buffer"
        );
    }

    // Announced for every dequeued frame; a failed decode leaves the previous output
    worker.events.frame_ready();
    LoopAction::Continue
}

/// Handle on a running capture thread
pub struct CaptureLoop {
    controller: Option<LoopController<CaptureWorker>>,
    stopping: bool,
    failed: Arc<AtomicBool>,
    dequeued: Arc<AtomicU64>,
}

impl CaptureLoop {
    /// Spawn the capture thread with a streaming ring
    ///
    /// If the thread cannot be spawned the worker is dropped, which tears
    /// the ring down.
    pub fn start(name: &str, worker: CaptureWorker) -> std::io::Result<Self> {
        let failed = Arc::clone(&worker.failed);
        let dequeued = Arc::clone(&worker.dequeued);
        let controller = LoopController::start(name, worker, capture_step)?;

        Ok(Self {
            controller: Some(controller),
            stopping: false,
            failed,
            dequeued,
        })
    }

    pub fn state(&self) -> LoopState {
        match &self.controller {
            Some(_) if self.stopping => LoopState::Stopping,
            Some(controller) if controller.is_running() => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }

    /// The loop stopped itself after a fatal device error
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn dequeued_count(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Stop and join the thread, returning the ring it owned
    pub fn stop(&mut self) -> Option<BufferRing> {
        let controller = self.controller.take()?;
        self.stopping = true;
        let name = controller.name().to_string();
        let worker = controller.stop();
        self.stopping = false;

        match worker {
            Some(worker) => {
                info!(
                    name = %name,
                    frames = self.dequeued_count(),
                    failed = self.has_failed(),
                    "Capture loop stopped"
                );
                Some(worker.ring)
            }
            None => {
                debug!(name = %name, "Capture loop lost its ring");
                None
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if let Some(mut ring) = self.stop() {
            ring.stop();
            ring.free();
        }
    }
}
