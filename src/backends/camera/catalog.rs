// SPDX-License-Identifier: GPL-3.0-only

//! Format catalog enumeration
//!
//! Walks encodings, then discrete frame sizes per encoding, then discrete
//! frame intervals per size. A size with no enumerable interval still yields
//! one descriptor with the interval left unspecified, as does an interval
//! with a zero term.

use super::CaptureDevice;
use super::types::{FormatDescriptor, FrameInterval};
use crate::errors::DeviceError;
use tracing::{debug, info, warn};

/// Drivers end every enumeration with EINVAL; anything else is worth a warning
fn log_enumeration_end(device: &str, level: &str, error: &DeviceError) {
    if error.code == libc::EINVAL {
        debug!(device, level, "Enumeration finished");
    } else {
        warn!(device, level, error = %error, "Enumeration stopped by device error");
    }
}

/// Build the ordered catalog of supported formats
///
/// Never fails; query errors truncate the catalog at the level they occur.
pub fn enumerate(device: &dyn CaptureDevice) -> Vec<FormatDescriptor> {
    let path = device.path();
    let mut formats = Vec::new();

    for format_index in 0.. {
        let encoding = match device.enum_format(format_index) {
            Ok(encoding) => encoding,
            Err(e) => {
                log_enumeration_end(path, "encoding", &e);
                break;
            }
        };

        for size_index in 0.. {
            let (width, height) = match device.enum_frame_size(encoding.fourcc, size_index) {
                Ok(size) => size,
                Err(e) => {
                    log_enumeration_end(path, "frame size", &e);
                    break;
                }
            };

            if width == 0 || height == 0 {
                debug!(device = path, %encoding.fourcc, "Skipping zero-sized frame size");
                continue;
            }

            for interval_index in 0.. {
                match device.enum_frame_interval(encoding.fourcc, width, height, interval_index) {
                    Ok(interval) => {
                        if !interval.is_specified() {
                            debug!(device = path, %interval, "Interval carries no rate, leaving it unspecified");
                        }
                        formats.push(FormatDescriptor {
                            width,
                            height,
                            encoding: encoding.fourcc,
                            description: encoding.description.clone(),
                            frame_interval: Some(interval).filter(FrameInterval::is_specified),
                        })
                    }
                    Err(e) => {
                        if interval_index == 0 {
                            formats.push(FormatDescriptor {
                                width,
                                height,
                                encoding: encoding.fourcc,
                                description: encoding.description.clone(),
                                frame_interval: None,
                            });
                        }
                        log_enumeration_end(path, "frame interval", &e);
                        break;
                    }
                }
            }
        }
    }

    info!(device = path, count = formats.len(), "Enumerated formats");
    formats
}
