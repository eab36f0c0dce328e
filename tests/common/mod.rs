// SPDX-License-Identifier: GPL-3.0-only
// Helpers shared by integration tests; not every test binary uses all of them
#![allow(dead_code)]

//! In-memory capture device for integration tests
//!
//! `MockDevice` behaves like a V4L2 node: granted buffers are "mapped" into
//! heap memory that the mock writes frame payloads into on dequeue, the way
//! the kernel fills mmap'd buffers. Every protocol call is recorded.

use camera_feed::backends::camera::{
    BufferLocation, CaptureDevice, DequeuedBuffer, DeviceCapability, DeviceProvider,
    EncodingInfo, FeedEvents, FrameInterval, MappedRegion, NegotiatedFormat, SharedDevice,
};
use camera_feed::errors::{DeviceError, DeviceResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use v4l::FourCC;

/// One protocol call as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetFormat(u32, u32, FourCC),
    SetInterval(FrameInterval),
    RequestBuffers(u32),
    QueryBuffer(u32),
    Map(u32),
    Unmap(u32),
    Queue(u32),
    Dequeue(u32),
    DequeueError(i32),
    StreamOn,
    StreamOff,
}

/// Scripted outcome of one dequeue attempt
#[derive(Debug, Clone)]
pub enum DequeueStep {
    /// Fill the oldest queued buffer with this payload
    Frame(Vec<u8>),
    /// Nothing ready yet
    WouldBlock,
    /// Fail with this errno
    Fail(i32),
}

/// One encoding with its sizes and intervals
#[derive(Debug, Clone)]
pub struct MockFormat {
    pub fourcc: FourCC,
    pub description: String,
    pub sizes: Vec<(u32, u32, Vec<FrameInterval>)>,
}

impl MockFormat {
    pub fn new(code: &[u8; 4], sizes: Vec<(u32, u32, Vec<FrameInterval>)>) -> Self {
        Self {
            fourcc: FourCC::new(code),
            description: format!("{} test format", String::from_utf8_lossy(code)),
            sizes,
        }
    }
}

struct RegionPtr {
    ptr: *mut u8,
    len: usize,
}

// Only touched under the state mutex, and only for buffers the ring has queued
unsafe impl Send for RegionPtr {}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    script: VecDeque<DequeueStep>,
    queued: VecDeque<u32>,
    regions: BTreeMap<u32, RegionPtr>,
    streaming: bool,
    current: Option<NegotiatedFormat>,
    dequeue_attempts: usize,
}

/// Mapped heap memory standing in for an mmap'd buffer
pub struct MockRegion {
    index: u32,
    ptr: *mut u8,
    len: usize,
    state: Arc<Mutex<MockState>>,
}

unsafe impl Send for MockRegion {}

impl MappedRegion for MockRegion {
    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for MockRegion {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.regions.remove(&self.index);
        state.calls.push(Call::Unmap(self.index));
        drop(state);
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr, self.len,
            )));
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Configurable fake capture device
pub struct MockDevice {
    path: String,
    card: String,
    capabilities: u32,
    formats: Vec<MockFormat>,
    grant: Option<u32>,
    map_fail_at: Option<u32>,
    buffer_len: usize,
    fail_get_format: bool,
    fail_set_format: bool,
    fail_frame_rate: bool,
    fail_stream_on: bool,
    /// Dimensions the driver forces on every set_format
    forced_size: Option<(u32, u32)>,
    /// Extra bytes the driver adds to every row
    row_padding: u32,
    state: Arc<Mutex<MockState>>,
}

pub struct MockDeviceBuilder {
    device: MockDevice,
}

impl MockDeviceBuilder {
    pub fn card(mut self, card: &str) -> Self {
        self.device.card = card.to_string();
        self
    }

    pub fn format(mut self, format: MockFormat) -> Self {
        self.device.formats.push(format);
        self
    }

    pub fn grant(mut self, count: u32) -> Self {
        self.device.grant = Some(count);
        self
    }

    pub fn fail_map_at(mut self, index: u32) -> Self {
        self.device.map_fail_at = Some(index);
        self
    }

    pub fn buffer_len(mut self, len: usize) -> Self {
        self.device.buffer_len = len;
        self
    }

    pub fn not_capture(mut self) -> Self {
        self.device.capabilities = 0;
        self
    }

    pub fn no_streaming(mut self) -> Self {
        self.device.capabilities = DeviceCapability::VIDEO_CAPTURE;
        self
    }

    pub fn row_padding(mut self, bytes: u32) -> Self {
        self.device.row_padding = bytes;
        self
    }

    pub fn fail_get_format(mut self) -> Self {
        self.device.fail_get_format = true;
        self
    }

    pub fn fail_set_format(mut self) -> Self {
        self.device.fail_set_format = true;
        self
    }

    pub fn fail_frame_rate(mut self) -> Self {
        self.device.fail_frame_rate = true;
        self
    }

    pub fn fail_stream_on(mut self) -> Self {
        self.device.fail_stream_on = true;
        self
    }

    pub fn forced_size(mut self, width: u32, height: u32) -> Self {
        self.device.forced_size = Some((width, height));
        self
    }

    pub fn script(self, steps: impl IntoIterator<Item = DequeueStep>) -> Self {
        lock(&self.device.state).script.extend(steps);
        self
    }

    pub fn build(self) -> Arc<MockDevice> {
        Arc::new(self.device)
    }
}

impl MockDevice {
    pub fn builder(path: &str) -> MockDeviceBuilder {
        MockDeviceBuilder {
            device: MockDevice {
                path: path.to_string(),
                card: "Mock Camera".to_string(),
                capabilities: DeviceCapability::VIDEO_CAPTURE | DeviceCapability::STREAMING,
                formats: Vec::new(),
                grant: None,
                map_fail_at: None,
                buffer_len: 4096,
                fail_get_format: false,
                fail_set_format: false,
                fail_frame_rate: false,
                fail_stream_on: false,
                forced_size: None,
                row_padding: 0,
                state: Arc::new(Mutex::new(MockState::default())),
            },
        }
    }

    /// A YUYV device with one 4x2 size and a 30fps interval
    pub fn yuyv(path: &str) -> MockDeviceBuilder {
        Self::builder(path).format(MockFormat::new(
            b"YUYV",
            vec![(4, 2, vec![FrameInterval::new(1, 30)])],
        ))
    }

    pub fn push_steps(&self, steps: impl IntoIterator<Item = DequeueStep>) {
        lock(&self.state).script.extend(steps);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn mapped_count(&self) -> usize {
        lock(&self.state).regions.len()
    }

    pub fn queued(&self) -> Vec<u32> {
        lock(&self.state).queued.iter().copied().collect()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    pub fn dequeue_attempts(&self) -> usize {
        lock(&self.state).dequeue_attempts
    }

    pub fn shared(self: &Arc<Self>) -> SharedDevice {
        Arc::clone(self) as SharedDevice
    }

    fn error(op: &'static str, code: i32) -> DeviceError {
        DeviceError::new(op, code)
    }
}

impl CaptureDevice for MockDevice {
    fn path(&self) -> &str {
        &self.path
    }

    fn query_capability(&self) -> DeviceResult<DeviceCapability> {
        Ok(DeviceCapability {
            driver: "mock".to_string(),
            card: self.card.clone(),
            bus_info: "test".to_string(),
            capabilities: self.capabilities,
        })
    }

    fn get_format(&self) -> DeviceResult<NegotiatedFormat> {
        if self.fail_get_format {
            return Err(Self::error("VIDIOC_G_FMT", libc::EINVAL));
        }
        if let Some(current) = lock(&self.state).current {
            return Ok(current);
        }
        let format = self
            .formats
            .first()
            .ok_or(Self::error("VIDIOC_G_FMT", libc::EINVAL))?;
        let (width, height, _) = format.sizes.first().cloned().unwrap_or((0, 0, Vec::new()));
        Ok(NegotiatedFormat {
            width,
            height,
            encoding: format.fourcc,
            bytes_per_line: width * 2,
            size_image: width * height * 2,
        })
    }

    fn enum_format(&self, index: u32) -> DeviceResult<EncodingInfo> {
        let format = self
            .formats
            .get(index as usize)
            .ok_or(Self::error("VIDIOC_ENUM_FMT", libc::EINVAL))?;
        Ok(EncodingInfo {
            fourcc: format.fourcc,
            description: format.description.clone(),
        })
    }

    fn enum_frame_size(&self, encoding: FourCC, index: u32) -> DeviceResult<(u32, u32)> {
        self.formats
            .iter()
            .find(|format| format.fourcc == encoding)
            .and_then(|format| format.sizes.get(index as usize))
            .map(|(width, height, _)| (*width, *height))
            .ok_or(Self::error("VIDIOC_ENUM_FRAMESIZES", libc::EINVAL))
    }

    fn enum_frame_interval(
        &self,
        encoding: FourCC,
        width: u32,
        height: u32,
        index: u32,
    ) -> DeviceResult<FrameInterval> {
        self.formats
            .iter()
            .find(|format| format.fourcc == encoding)
            .and_then(|format| {
                format
                    .sizes
                    .iter()
                    .find(|(w, h, _)| *w == width && *h == height)
            })
            .and_then(|(_, _, intervals)| intervals.get(index as usize).copied())
            .ok_or(Self::error("VIDIOC_ENUM_FRAMEINTERVALS", libc::EINVAL))
    }

    fn set_format(
        &self,
        width: u32,
        height: u32,
        encoding: FourCC,
    ) -> DeviceResult<NegotiatedFormat> {
        let mut state = lock(&self.state);
        state.calls.push(Call::SetFormat(width, height, encoding));
        if self.fail_set_format {
            return Err(Self::error("VIDIOC_S_FMT", libc::EINVAL));
        }
        if state.streaming {
            return Err(Self::error("VIDIOC_S_FMT", libc::EBUSY));
        }
        let (width, height) = self.forced_size.unwrap_or((width, height));
        let bytes_per_line = width * 2 + self.row_padding;
        let negotiated = NegotiatedFormat {
            width,
            height,
            encoding,
            bytes_per_line,
            size_image: bytes_per_line * height,
        };
        state.current = Some(negotiated);
        Ok(negotiated)
    }

    fn set_frame_interval(&self, interval: FrameInterval) -> DeviceResult<()> {
        lock(&self.state).calls.push(Call::SetInterval(interval));
        if self.fail_frame_rate {
            return Err(Self::error("VIDIOC_S_PARM", libc::EINVAL));
        }
        Ok(())
    }

    fn request_buffers(&self, count: u32) -> DeviceResult<u32> {
        let mut state = lock(&self.state);
        state.calls.push(Call::RequestBuffers(count));
        if count == 0 {
            return Ok(0);
        }
        Ok(self.grant.unwrap_or(count))
    }

    fn query_buffer(&self, index: u32) -> DeviceResult<BufferLocation> {
        lock(&self.state).calls.push(Call::QueryBuffer(index));
        Ok(BufferLocation {
            index,
            length: self.buffer_len,
            offset: index * self.buffer_len as u32,
        })
    }

    fn map_buffer(&self, location: &BufferLocation) -> DeviceResult<Box<dyn MappedRegion>> {
        let mut state = lock(&self.state);
        if self.map_fail_at == Some(location.index) {
            return Err(Self::error("mmap", libc::ENOMEM));
        }
        state.calls.push(Call::Map(location.index));

        let memory = vec![0u8; location.length].into_boxed_slice();
        let len = memory.len();
        let ptr = Box::into_raw(memory) as *mut u8;
        state.regions.insert(location.index, RegionPtr { ptr, len });

        Ok(Box::new(MockRegion {
            index: location.index,
            ptr,
            len,
            state: Arc::clone(&self.state),
        }))
    }

    fn queue_buffer(&self, index: u32) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(Call::Queue(index));
        if !state.regions.contains_key(&index) || state.queued.contains(&index) {
            return Err(Self::error("VIDIOC_QBUF", libc::EINVAL));
        }
        state.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&self) -> DeviceResult<Option<DequeuedBuffer>> {
        let mut state = lock(&self.state);
        state.dequeue_attempts += 1;
        if !state.streaming {
            state.calls.push(Call::DequeueError(libc::EINVAL));
            return Err(Self::error("VIDIOC_DQBUF", libc::EINVAL));
        }

        match state.script.pop_front().unwrap_or(DequeueStep::WouldBlock) {
            DequeueStep::WouldBlock => Ok(None),
            DequeueStep::Fail(code) => {
                state.calls.push(Call::DequeueError(code));
                Err(Self::error("VIDIOC_DQBUF", code))
            }
            DequeueStep::Frame(payload) => {
                let Some(index) = state.queued.pop_front() else {
                    // Nothing queued: the frame is dropped like a real driver would
                    return Ok(None);
                };
                let region = &state.regions[&index];
                let bytes_used = payload.len().min(region.len);
                unsafe {
                    std::ptr::copy_nonoverlapping(payload.as_ptr(), region.ptr, bytes_used);
                }
                state.calls.push(Call::Dequeue(index));
                Ok(Some(DequeuedBuffer {
                    index,
                    bytes_used,
                    sequence: 0,
                }))
            }
        }
    }

    fn stream_on(&self) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(Call::StreamOn);
        if self.fail_stream_on {
            return Err(Self::error("VIDIOC_STREAMON", libc::EIO));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self) -> DeviceResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(Call::StreamOff);
        state.streaming = false;
        state.queued.clear();
        Ok(())
    }
}

/// Provider over a mutable set of mock devices
#[derive(Default)]
pub struct MockProvider {
    devices: Mutex<BTreeMap<String, Arc<MockDevice>>>,
    opens: AtomicUsize,
    scans: AtomicUsize,
    /// Listed nodes refuse to open, as when another process holds them
    busy: AtomicBool,
}

impl MockProvider {
    pub fn insert(&self, device: Arc<MockDevice>) {
        let mut devices = self.devices.lock().unwrap();
        devices.insert(device.path().to_string(), device);
    }

    pub fn remove(&self, path: &str) {
        self.devices.lock().unwrap().remove(path);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

impl DeviceProvider for MockProvider {
    fn scan(&self) -> Vec<String> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.devices.lock().unwrap().keys().cloned().collect()
    }

    fn open(&self, path: &str) -> DeviceResult<SharedDevice> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.busy.load(Ordering::SeqCst) {
            return Err(DeviceError::new("open", libc::EBUSY));
        }
        self.devices
            .lock()
            .unwrap()
            .get(path)
            .map(|device| Arc::clone(device) as SharedDevice)
            .ok_or(DeviceError::new("open", libc::ENOENT))
    }
}

/// Counts notifications
#[derive(Default)]
pub struct RecordingEvents {
    pub frames: AtomicUsize,
    pub format_changes: AtomicUsize,
}

impl RecordingEvents {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn format_changes(&self) -> usize {
        self.format_changes.load(Ordering::SeqCst)
    }
}

impl FeedEvents for RecordingEvents {
    fn frame_ready(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn format_changed(&self) {
        self.format_changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or the timeout expires
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Encode a JPEG test image
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Jpeg)
        .expect("encode JPEG fixture");
    bytes.into_inner()
}

/// Packed YUYV payload where every pixel has the given components
pub fn yuyv_payload(width: u32, height: u32, y: u8, u: u8, v: u8) -> Vec<u8> {
    let groups = (width * height / 2) as usize;
    [y, u, y, v].repeat(groups)
}
