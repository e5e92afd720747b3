//! CPU-side `IoClient` talking to an I/O-worker-side `IoServer` through real
//! rings, dispatching to a custom `DeviceModel`, including the stuck-call
//! deadline path when the server never ticks (spec §4.3, §8 Scenario 5).

use std::sync::Arc;
use vm_core::ring::RingBuffer;
use vm_io::{DeviceModel, IoClient, IoServer, PendingCalls, RequestKind, ResponseKind};

#[derive(Default)]
struct RecordingDevice {
    mmio_writes: Vec<(u64, u64)>,
}

impl DeviceModel for RecordingDevice {
    fn port_read(&mut self, port: u16, _size: u8) -> u32 {
        u32::from(port) * 2
    }
    fn port_write(&mut self, _port: u16, _size: u8, _value: u32) {}
    fn mmio_read(&mut self, paddr: u64, _size: u8) -> u64 {
        paddr + 1
    }
    fn mmio_write(&mut self, paddr: u64, _size: u8, value: u64) {
        self.mmio_writes.push((paddr, value));
    }
    fn serial_notify(&mut self, _bytes: &[u8]) {}

    fn mmio_write_is_posted(&self, _paddr: u64) -> bool {
        true
    }
}

#[test]
fn mmio_round_trip_and_posted_write_gets_no_response() {
    let req_ring = Arc::new(RingBuffer::new(256));
    let resp_ring = Arc::new(RingBuffer::new(256));
    let client = IoClient::new(req_ring.clone(), resp_ring.clone());
    let server = IoServer::new(req_ring, resp_ring);
    let mut model = RecordingDevice::default();

    let read_id = client.issue(RequestKind::MmioRead { paddr: 0x1000, size: 4 }).unwrap();
    let write_id = client.issue(RequestKind::MmioWrite { paddr: 0x2000, size: 4, value: 7 }).unwrap();
    assert_eq!(server.tick(&mut model).unwrap(), 2);

    assert_eq!(client.try_recv(read_id).unwrap().kind, ResponseKind::Value(0x1001));
    assert_eq!(client.try_recv(write_id), None);
    assert_eq!(model.mmio_writes, vec![(0x2000, 7)]);
}

#[test]
fn call_with_no_server_tick_is_detected_as_stuck_after_deadline() {
    let req_ring = Arc::new(RingBuffer::new(256));
    let resp_ring = Arc::new(RingBuffer::new(256));
    let client = IoClient::new(req_ring, resp_ring);

    let mut pending = PendingCalls::new();
    let id = client.issue(RequestKind::PortRead { port: 0x60, size: 1 }).unwrap();
    pending.track(id, 100);

    assert!(client.try_recv(id).is_none());
    assert!(pending.stuck(105, 10).is_empty());
    assert_eq!(pending.stuck(250, 10), vec![id]);
    assert_eq!(pending.pending_count(), 1);
}
