// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::OutputMode;
use crate::constants::{buffers, devices, timing};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Capture pipeline settings
///
/// Every field falls back to its default when missing from the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory scanned for device nodes
    pub device_dir: String,
    /// File name prefix of device nodes
    pub device_prefix: String,
    /// Buffers requested from the driver
    pub buffer_count: u32,
    /// Sleep between dequeue attempts, in milliseconds
    pub poll_interval_ms: u64,
    /// Interval between discovery rescans, in milliseconds
    pub discovery_interval_ms: u64,
    /// Output mode when the feed parameters do not name one
    pub output_mode: OutputMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_dir: devices::DEVICE_DIR.to_string(),
            device_prefix: devices::DEVICE_PREFIX.to_string(),
            buffer_count: buffers::REQUESTED_COUNT,
            poll_interval_ms: timing::DEQUEUE_POLL_MS,
            discovery_interval_ms: timing::DISCOVERY_INTERVAL_MS,
            output_mode: OutputMode::default(),
        }
    }
}

impl CaptureConfig {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        debug!(path = %path.display(), "Loaded capture configuration");
        Ok(config)
    }

    /// Load from a file if given, falling back to defaults when it is unreadable
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.buffer_count < buffers::MIN_GRANTED {
            return Err(AppError::Config(format!(
                "buffer_count must be at least {}",
                buffers::MIN_GRANTED
            )));
        }
        if self.device_prefix.is_empty() {
            return Err(AppError::Config("device_prefix must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
