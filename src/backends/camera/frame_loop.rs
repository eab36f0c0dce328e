// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for background loops
//!
//! Used by the per-device capture loop and by device discovery. The loop
//! thread owns its state while running and hands it back when joined, so
//! resources inside the state can only be torn down after the thread exits.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run the next iteration right away
    Continue,
    /// Sleep up to the given duration; a stop request cuts the sleep short
    Wait(Duration),
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = LoopController::start("poll", counter, |counter| {
///     *counter += 1;
///     LoopAction::Wait(Duration::from_millis(10))
/// })?;
///
/// // Later, stop the loop and take the state back
/// let counter = controller.stop();
/// ```
pub struct LoopController<S> {
    /// Thread handle for joining; yields the loop state
    thread_handle: Option<JoinHandle<S>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl<S: Send + 'static> LoopController<S> {
    /// Start a new loop in a named thread
    ///
    /// The closure is called repeatedly with the state until it returns
    /// `LoopAction::Stop` or a stop is requested.
    pub fn start<F>(name: &str, state: S, mut loop_fn: F) -> io::Result<Self>
    where
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = state;
                debug!(name = %name_clone, "Loop thread started");

                loop {
                    // Check stop signal first
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn(&mut state) {
                        LoopAction::Continue => {}
                        LoopAction::Wait(duration) => thread::park_timeout(duration),
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Loop thread exiting");
                state
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Get a clone of the stop signal for external use
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.thread_handle {
            handle.thread().unpark();
        }
    }

    /// Stop the loop, wait for the thread and take the state back
    ///
    /// Returns `None` if the thread panicked.
    pub fn stop(mut self) -> Option<S> {
        self.request_stop();
        self.join()
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) -> Option<S> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for loop thread to finish");
        match handle.join() {
            Ok(state) => {
                debug!(name = %self.name, "Loop thread finished");
                Some(state)
            }
            Err(e) => {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> Drop for LoopController<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "LoopController dropped, stopping loop");
            self.stop_signal.store(true, Ordering::SeqCst);
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!(name = %self.name, "Loop thread panicked");
            }
        }
    }
}
