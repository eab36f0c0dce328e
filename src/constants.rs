// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Buffer ring sizing
pub mod buffers {
    /// Number of buffers requested from the driver
    pub const REQUESTED_COUNT: u32 = 4;

    /// Fewest granted buffers a ring can stream with
    pub const MIN_GRANTED: u32 = 2;
}

/// Capture and discovery timing
pub mod timing {
    use super::Duration;

    /// Sleep between dequeue attempts when no buffer is ready
    pub const DEQUEUE_POLL_MS: u64 = 10;

    /// Interval between device namespace rescans
    pub const DISCOVERY_INTERVAL_MS: u64 = 1000;

    pub const fn dequeue_poll() -> Duration {
        Duration::from_millis(DEQUEUE_POLL_MS)
    }

    pub const fn discovery_interval() -> Duration {
        Duration::from_millis(DISCOVERY_INTERVAL_MS)
    }
}

/// Device namespace
pub mod devices {
    /// Directory scanned for capture device nodes
    pub const DEVICE_DIR: &str = "/dev";

    /// File name prefix of capture device nodes
    pub const DEVICE_PREFIX: &str = "video";
}
