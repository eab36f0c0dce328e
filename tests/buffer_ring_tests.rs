// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the mmap buffer ring

mod common;

use camera_feed::backends::camera::BufferRing;
use camera_feed::backends::camera::buffer_ring::BufferState;
use camera_feed::errors::RingError;
use common::{Call, DequeueStep, MockDevice};

#[test]
fn test_allocate_maps_every_granted_buffer() {
    let device = MockDevice::yuyv("/dev/video0").build();

    let ring = BufferRing::allocate(device.shared(), 4).unwrap();

    assert_eq!(ring.len(), 4);
    assert_eq!(device.mapped_count(), 4);
    assert_eq!(ring.queued_count(), 0);
    assert!(!ring.is_streaming());
}

#[test]
fn test_driver_may_grant_fewer_buffers() {
    let device = MockDevice::yuyv("/dev/video0").grant(3).build();

    let ring = BufferRing::allocate(device.shared(), 8).unwrap();

    assert_eq!(ring.len(), 3);
    assert_eq!(device.mapped_count(), 3);
}

#[test]
fn test_start_queues_every_buffer() {
    let device = MockDevice::yuyv("/dev/video0").build();
    let mut ring = BufferRing::allocate(device.shared(), 4).unwrap();

    ring.start().unwrap();

    assert!(ring.is_streaming());
    assert_eq!(ring.queued_count(), 4);
    assert_eq!(device.queued(), vec![0, 1, 2, 3]);
    // Everything is queued before streaming starts
    let calls = device.calls();
    let stream_on = calls.iter().position(|c| *c == Call::StreamOn).unwrap();
    let last_queue = calls
        .iter()
        .rposition(|c| matches!(c, Call::Queue(_)))
        .unwrap();
    assert!(last_queue < stream_on);
}

#[test]
fn test_single_grant_is_insufficient() {
    let device = MockDevice::yuyv("/dev/video0").grant(1).build();

    let result = BufferRing::allocate(device.shared(), 4);

    assert!(matches!(
        result,
        Err(RingError::InsufficientBuffers {
            requested: 4,
            granted: 1
        })
    ));
    assert_eq!(device.mapped_count(), 0);
    assert_eq!(device.count_calls(|c| matches!(c, Call::Map(_))), 0);
    // Kernel buffers are released again
    assert_eq!(device.calls().last(), Some(&Call::RequestBuffers(0)));
}

#[test]
fn test_map_failure_unmaps_earlier_buffers() {
    for failing in 0..4 {
        let device = MockDevice::yuyv("/dev/video0").fail_map_at(failing).build();

        let result = BufferRing::allocate(device.shared(), 4);

        assert!(
            matches!(result, Err(RingError::Device(_))),
            "allocation should fail when mapping buffer {} fails",
            failing
        );
        assert_eq!(device.mapped_count(), 0, "failing at {}", failing);
        for index in 0..failing {
            assert_eq!(
                device.count_calls(|c| *c == Call::Unmap(index)),
                1,
                "buffer {} should be unmapped once",
                index
            );
        }
        assert_eq!(device.calls().last(), Some(&Call::RequestBuffers(0)));
    }
}

#[test]
fn test_dequeue_and_requeue_track_ownership() {
    let device = MockDevice::yuyv("/dev/video0")
        .script([DequeueStep::Frame(vec![1, 2, 3, 4])])
        .build();
    let mut ring = BufferRing::allocate(device.shared(), 4).unwrap();
    ring.start().unwrap();

    let dequeued = ring.dequeue().unwrap().unwrap();
    assert_eq!(dequeued.index, 0);
    assert_eq!(ring.state(0), Some(BufferState::Owned));
    assert_eq!(ring.queued_count(), 3);
    assert_eq!(ring.payload(&dequeued), Some(&[1u8, 2, 3, 4][..]));

    ring.requeue(dequeued.index).unwrap();
    assert_eq!(ring.state(0), Some(BufferState::Queued));
    assert_eq!(ring.payload(&dequeued), None);
    assert_eq!(device.queued(), vec![1, 2, 3, 0]);
}

#[test]
fn test_requeue_of_queued_buffer_is_noop() {
    let device = MockDevice::yuyv("/dev/video0").build();
    let mut ring = BufferRing::allocate(device.shared(), 2).unwrap();
    ring.start().unwrap();
    device.clear_calls();

    ring.requeue(1).unwrap();

    assert_eq!(device.count_calls(|c| matches!(c, Call::Queue(_))), 0);
    assert!(ring.requeue(7).is_err());
}

#[test]
fn test_would_block_is_not_an_error() {
    let device = MockDevice::yuyv("/dev/video0").build();
    let mut ring = BufferRing::allocate(device.shared(), 2).unwrap();
    ring.start().unwrap();

    assert_eq!(ring.dequeue().unwrap(), None);
    assert_eq!(ring.queued_count(), 2);
}

#[test]
fn test_stop_returns_buffers_to_process() {
    let device = MockDevice::yuyv("/dev/video0").build();
    let mut ring = BufferRing::allocate(device.shared(), 3).unwrap();
    ring.start().unwrap();

    ring.stop();

    assert!(!ring.is_streaming());
    assert_eq!(ring.queued_count(), 0);
    assert!(!device.is_streaming());
}

#[test]
fn test_free_unmaps_then_releases() {
    let device = MockDevice::yuyv("/dev/video0").build();
    let mut ring = BufferRing::allocate(device.shared(), 2).unwrap();
    ring.start().unwrap();
    device.clear_calls();

    ring.free();

    assert_eq!(
        device.calls(),
        vec![
            Call::StreamOff,
            Call::Unmap(0),
            Call::Unmap(1),
            Call::RequestBuffers(0)
        ]
    );
    assert_eq!(device.mapped_count(), 0);
}

#[test]
fn test_drop_releases_everything() {
    let device = MockDevice::yuyv("/dev/video0").build();
    {
        let mut ring = BufferRing::allocate(device.shared(), 4).unwrap();
        ring.start().unwrap();
    }

    assert_eq!(device.mapped_count(), 0);
    assert!(!device.is_streaming());
    assert_eq!(device.count_calls(|c| *c == Call::RequestBuffers(0)), 1);
}
