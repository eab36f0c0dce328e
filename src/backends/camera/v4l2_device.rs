// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device backed by the v4l crate
//!
//! Negotiation goes through [`v4l::video::Capture`]. The indexed enumeration
//! and the fine-grained buffer calls the ring needs use the crate's raw
//! ioctl layer, so every step stays individually observable.

use super::types::{
    BufferLocation, DequeuedBuffer, DeviceCapability, EncodingInfo, FrameInterval,
    NegotiatedFormat,
};
use super::{CaptureDevice, DeviceProvider, MappedRegion, SharedDevice};
use crate::constants::devices;
use crate::errors::{DeviceError, DeviceResult};
use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::Arc;
use std::{mem, ptr};
use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::format::Description;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::v4l_sys::{v4l2_buffer, v4l2_fmtdesc, v4l2_frmivalenum, v4l2_frmsizeenum, v4l2_requestbuffers};
use v4l::v4l2::{self, vidioc};
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Device, Format, FourCC, Fraction, Memory};

// ===== Helper Functions =====

fn negotiated_from(format: &Format) -> NegotiatedFormat {
    NegotiatedFormat {
        width: format.width,
        height: format.height,
        encoding: format.fourcc,
        bytes_per_line: format.stride,
        size_image: format.size,
    }
}

/// Only discrete sizes are cataloged; stepwise ranges end the enumeration
fn discrete_size(size: FrameSizeEnum) -> DeviceResult<(u32, u32)> {
    match size {
        FrameSizeEnum::Discrete(discrete) => Ok((discrete.width, discrete.height)),
        FrameSizeEnum::Stepwise(_) => Err(DeviceError::new("VIDIOC_ENUM_FRAMESIZES", libc::ENOTTY)),
    }
}

fn discrete_interval(interval: FrameIntervalEnum) -> DeviceResult<FrameInterval> {
    match interval {
        FrameIntervalEnum::Discrete(fraction) => {
            Ok(FrameInterval::new(fraction.numerator, fraction.denominator))
        }
        FrameIntervalEnum::Stepwise(_) => {
            Err(DeviceError::new("VIDIOC_ENUM_FRAMEINTERVALS", libc::ENOTTY))
        }
    }
}

fn buffer_desc(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        ..unsafe { mem::zeroed() }
    }
}

// ===== Mapped Memory =====

/// One mmap'd buffer; unmapped on drop
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared memory with no thread affinity.
unsafe impl Send for MmapRegion {}

impl MappedRegion for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { v4l2::munmap(self.ptr.as_ptr() as *mut c_void, self.len) } {
            warn!(len = self.len, error = %e, "Failed to unmap capture buffer");
        }
    }
}

// ===== Device =====

/// An open V4L2 capture node
pub struct V4l2Device {
    path: String,
    device: Device,
}

impl V4l2Device {
    /// Open a device node read-write and non-blocking
    pub fn open(path: &str) -> DeviceResult<Self> {
        let device = Device::with_path(path).map_err(|e| DeviceError::from_io("open", e))?;

        debug!(device = %path, "Opened V4L2 device");
        Ok(Self {
            path: path.to_string(),
            device,
        })
    }

    /// Issue a raw ioctl, retrying when interrupted by a signal
    fn xioctl<T>(&self, request: vidioc::_IOC_TYPE, arg: &mut T, op: &'static str) -> DeviceResult<()> {
        let fd = self.device.handle().fd();
        loop {
            match unsafe { v4l2::ioctl(fd, request, arg as *mut T as *mut c_void) } {
                Ok(()) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(DeviceError::from_io(op, e)),
            }
        }
    }

    fn stream_ioctl(&self, request: vidioc::_IOC_TYPE, op: &'static str) -> DeviceResult<()> {
        let mut buf_type = Type::VideoCapture as c_int;
        self.xioctl(request, &mut buf_type, op)
    }
}

impl CaptureDevice for V4l2Device {
    fn path(&self) -> &str {
        &self.path
    }

    fn query_capability(&self) -> DeviceResult<DeviceCapability> {
        let caps = self
            .device
            .query_caps()
            .map_err(|e| DeviceError::from_io("VIDIOC_QUERYCAP", e))?;

        Ok(DeviceCapability {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            capabilities: u32::from(caps.capabilities),
        })
    }

    fn get_format(&self) -> DeviceResult<NegotiatedFormat> {
        let format = self
            .device
            .format()
            .map_err(|e| DeviceError::from_io("VIDIOC_G_FMT", e))?;
        Ok(negotiated_from(&format))
    }

    fn enum_format(&self, index: u32) -> DeviceResult<EncodingInfo> {
        let mut desc = v4l2_fmtdesc {
            index,
            type_: Type::VideoCapture as u32,
            ..unsafe { mem::zeroed() }
        };
        self.xioctl(vidioc::VIDIOC_ENUM_FMT, &mut desc, "VIDIOC_ENUM_FMT")?;

        let desc = Description::from(desc);
        Ok(EncodingInfo {
            fourcc: desc.fourcc,
            description: desc.description,
        })
    }

    fn enum_frame_size(&self, encoding: FourCC, index: u32) -> DeviceResult<(u32, u32)> {
        let mut size = v4l2_frmsizeenum {
            index,
            pixel_format: u32::from(encoding),
            ..unsafe { mem::zeroed() }
        };
        self.xioctl(vidioc::VIDIOC_ENUM_FRAMESIZES, &mut size, "VIDIOC_ENUM_FRAMESIZES")?;

        let size = FrameSizeEnum::try_from(size).map_err(|reason| {
            debug!(device = %self.path, %encoding, %reason, "Unrecognized frame size type");
            DeviceError::new("VIDIOC_ENUM_FRAMESIZES", libc::ENOTTY)
        })?;
        discrete_size(size).inspect_err(|_| {
            debug!(device = %self.path, %encoding, "Skipping non-discrete frame sizes");
        })
    }

    fn enum_frame_interval(
        &self,
        encoding: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> DeviceResult<FrameInterval> {
        let mut ival = v4l2_frmivalenum {
            index,
            pixel_format: u32::from(encoding),
            width,
            height,
            ..unsafe { mem::zeroed() }
        };
        self.xioctl(
            vidioc::VIDIOC_ENUM_FRAMEINTERVALS,
            &mut ival,
            "VIDIOC_ENUM_FRAMEINTERVALS",
        )?;

        let interval = FrameIntervalEnum::try_from(ival)
            .map_err(|_| DeviceError::new("VIDIOC_ENUM_FRAMEINTERVALS", libc::ENOTTY))?;
        discrete_interval(interval)
    }

    fn set_format(
        &self,
        width: u32,
        height: u32,
        encoding: FourCC,
    ) -> DeviceResult<NegotiatedFormat> {
        let requested = Format::new(width, height, encoding);
        let applied = self
            .device
            .set_format(&requested)
            .map_err(|e| DeviceError::from_io("VIDIOC_S_FMT", e))?;

        let negotiated = negotiated_from(&applied);
        if negotiated.width != width || negotiated.height != height {
            debug!(
                device = %self.path,
                requested = format!("{}x{}", width, height),
                actual = format!("{}x{}", negotiated.width, negotiated.height),
                "Driver adjusted frame size"
            );
        }
        Ok(negotiated)
    }

    fn set_frame_interval(&self, interval: FrameInterval) -> DeviceResult<()> {
        let params = Parameters::new(Fraction::new(interval.numerator, interval.denominator));
        let applied = self
            .device
            .set_params(&params)
            .map_err(|e| DeviceError::from_io("VIDIOC_S_PARM", e))?;
        debug!(device = %self.path, interval = %applied.interval, "Frame interval applied");
        Ok(())
    }

    fn request_buffers(&self, count: u32) -> DeviceResult<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            ..unsafe { mem::zeroed() }
        };
        self.xioctl(vidioc::VIDIOC_REQBUFS, &mut req, "VIDIOC_REQBUFS")?;
        Ok(req.count)
    }

    fn query_buffer(&self, index: u32) -> DeviceResult<BufferLocation> {
        let mut buf = buffer_desc(index);
        self.xioctl(vidioc::VIDIOC_QUERYBUF, &mut buf, "VIDIOC_QUERYBUF")?;
        Ok(BufferLocation {
            index,
            length: buf.length as usize,
            offset: unsafe { buf.m.offset },
        })
    }

    fn map_buffer(&self, location: &BufferLocation) -> DeviceResult<Box<dyn MappedRegion>> {
        let mapping = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                location.length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.device.handle().fd(),
                location.offset as libc::off_t,
            )
        }
        .map_err(|e| DeviceError::from_io("mmap", e))?;
        let ptr = NonNull::new(mapping as *mut u8).ok_or(DeviceError::new("mmap", libc::ENOMEM))?;

        Ok(Box::new(MmapRegion {
            ptr,
            len: location.length,
        }))
    }

    fn queue_buffer(&self, index: u32) -> DeviceResult<()> {
        let mut buf = buffer_desc(index);
        self.xioctl(vidioc::VIDIOC_QBUF, &mut buf, "VIDIOC_QBUF")
    }

    fn dequeue_buffer(&self) -> DeviceResult<Option<DequeuedBuffer>> {
        let mut buf = buffer_desc(0);
        match self.xioctl(vidioc::VIDIOC_DQBUF, &mut buf, "VIDIOC_DQBUF") {
            Ok(()) => Ok(Some(DequeuedBuffer {
                index: buf.index,
                bytes_used: buf.bytesused as usize,
                sequence: buf.sequence,
            })),
            Err(e) if e.is_would_block() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn stream_on(&self) -> DeviceResult<()> {
        self.stream_ioctl(vidioc::VIDIOC_STREAMON, "VIDIOC_STREAMON")
    }

    fn stream_off(&self) -> DeviceResult<()> {
        self.stream_ioctl(vidioc::VIDIOC_STREAMOFF, "VIDIOC_STREAMOFF")
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        debug!(device = %self.path, "Closing V4L2 device");
    }
}

// ===== Provider =====

/// Scans a directory for capture nodes and opens them as [`V4l2Device`]s
#[derive(Debug, Clone)]
pub struct V4l2Provider {
    dir: String,
    prefix: String,
}

impl V4l2Provider {
    pub fn new(dir: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl Default for V4l2Provider {
    fn default() -> Self {
        Self::new(devices::DEVICE_DIR, devices::DEVICE_PREFIX)
    }
}

impl DeviceProvider for V4l2Provider {
    fn scan(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir, error = %e, "Failed to read device directory");
                return Vec::new();
            }
        };

        let mut paths: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();
                name_str
                    .starts_with(&self.prefix)
                    .then(|| format!("{}/{}", self.dir.trim_end_matches('/'), name_str))
            })
            .collect();
        paths.sort();
        paths
    }

    fn open(&self, path: &str) -> DeviceResult<SharedDevice> {
        Ok(Arc::new(V4l2Device::open(path)?))
    }
}
