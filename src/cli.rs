// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for capture devices
//!
//! This module provides command-line functionality for:
//! - Listing capture devices and their formats
//! - Capturing frames to an image file
//! - Watching devices appear and vanish

use camera_feed::backends::camera::{
    DeviceDiscovery, DeviceSession, DiscoveryListener, FeedEvents, FeedParameters, FrameImage,
    ImageFormat, NoopListener, OUTPUT_PARAMETER, OutputMode, SessionOptions, SharedSession,
};
use camera_feed::config::CaptureConfig;
use camera_feed::errors::{AppError, AppResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// List all capture devices and their formats
pub fn list_devices(config: &CaptureConfig) -> AppResult<()> {
    let discovery = DeviceDiscovery::from_config(config, Arc::new(NoopListener));
    discovery.rescan();

    let sessions = discovery.sessions();
    if sessions.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available capture devices:");
    println!();
    for session in sessions {
        let session = lock_session(&session);
        println!("  {} ({})", session.name(), session.device_path());
        for (index, format) in session.formats().iter().enumerate() {
            println!("      [{}] {} ({})", index, format, format.description);
        }
        println!();
    }

    Ok(())
}

/// Frame counter that capture can block on
#[derive(Default)]
struct FrameWaiter {
    frames: Mutex<u64>,
    ready: Condvar,
}

impl FrameWaiter {
    /// Wait until `count` frames arrived or the timeout expires
    fn wait_for(&self, count: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut frames = match self.frames.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *frames < count {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            frames = match self.ready.wait_timeout(frames, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *frames
    }
}

impl FeedEvents for FrameWaiter {
    fn frame_ready(&self) {
        if let Ok(mut frames) = self.frames.lock() {
            *frames += 1;
        }
        self.ready.notify_all();
    }

    fn format_changed(&self) {}
}

/// Capture frames from one device and save the last one
pub fn capture(
    config: &CaptureConfig,
    device: &str,
    format_index: usize,
    output_mode: Option<OutputMode>,
    frames: u64,
    timeout: Duration,
    output: &Path,
) -> AppResult<()> {
    let waiter = Arc::new(FrameWaiter::default());
    let mut session = DeviceSession::open(
        device,
        SessionOptions::from(config),
        Arc::clone(&waiter) as Arc<dyn FeedEvents>,
    )
    .map_err(|e| AppError::Other(format!("Failed to open {}: {}", device, e)))?;

    let mut parameters = FeedParameters::new();
    if let Some(mode) = output_mode {
        parameters.insert(OUTPUT_PARAMETER.to_string(), mode.as_str().to_string());
    }

    session.select_format(format_index, &parameters)?;
    session.activate()?;
    println!("Capturing {} frame(s) from {}...", frames, session.name());

    let received = waiter.wait_for(frames, timeout);
    if session.capture_failed() {
        warn!(device, "Capture loop stopped on a device error");
    }
    session.deactivate()?;

    let frame = session
        .latest_frame()
        .ok_or_else(|| {
            AppError::Other(format!("No frame decoded ({} notifications)", received))
        })?;
    let image = frame
        .primary
        .as_ref()
        .ok_or_else(|| AppError::Other("Decoded frame has no image".to_string()))?;

    save_image(image, output)?;
    println!(
        "Saved frame {} ({}x{}) to {}",
        frame.sequence,
        image.width,
        image.height,
        output.display()
    );
    Ok(())
}

/// Write a decoded image with the matching color type
fn save_image(frame_image: &FrameImage, path: &Path) -> AppResult<()> {
    let color = match frame_image.format {
        ImageFormat::L8 => image::ExtendedColorType::L8,
        ImageFormat::La8 => image::ExtendedColorType::La8,
        ImageFormat::Rgb8 => image::ExtendedColorType::Rgb8,
        ImageFormat::Rgba8 => image::ExtendedColorType::Rgba8,
        ImageFormat::Rg8 => {
            return Err(AppError::Image(
                "chroma planes cannot be saved as an image".to_string(),
            ));
        }
    };
    image::save_buffer(
        path,
        &frame_image.data,
        frame_image.width,
        frame_image.height,
        color,
    )?;
    Ok(())
}

/// Logs devices as discovery adds and removes them
struct LoggingListener;

impl DiscoveryListener for LoggingListener {
    fn feed_added(&self, session: &SharedSession) {
        let session = lock_session(session);
        info!(device = %session.device_path(), name = %session.name(), "Device appeared");
        println!("+ {} ({})", session.name(), session.device_path());
    }

    fn feed_removed(&self, session: &SharedSession) {
        let session = lock_session(session);
        info!(device = %session.device_path(), "Device vanished");
        println!("- {} ({})", session.name(), session.device_path());
    }
}

/// Run discovery until Ctrl-C
pub fn watch(config: &CaptureConfig) -> AppResult<()> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || running_clone.store(false, Ordering::SeqCst))
        .map_err(|e| AppError::Other(format!("Failed to install Ctrl-C handler: {}", e)))?;

    let mut discovery = DeviceDiscovery::from_config(config, Arc::new(LoggingListener));
    discovery.start()?;
    println!("Watching for capture devices (Ctrl-C to stop)...");

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    discovery.stop();
    println!("Stopped.");
    Ok(())
}

fn lock_session(session: &SharedSession) -> std::sync::MutexGuard<'_, DeviceSession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
