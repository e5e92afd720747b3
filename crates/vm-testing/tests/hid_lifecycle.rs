//! HID broker lifecycle against real `vm-core` rings: attach installs a
//! listener and claims the guest port, forwarded input reports flow through
//! the ring rather than the fallback queue, and detach leaves no trace
//! (spec §4.6).

use std::sync::Arc;
use vm_core::ring::RingBuffer;
use vm_hid::{Collection, HidBroker, HidInputReport};

#[test]
fn attach_forward_detach_round_trip_through_rings() {
    let mut broker = HidBroker::new();
    let input_ring = Arc::new(RingBuffer::new(1024));
    let output_ring = Arc::new(RingBuffer::new(1024));
    broker.attach_rings(input_ring.clone(), output_ring);

    let collections = vec![Collection {
        report_id: None,
        is_range: false,
        range_start: None,
        range_end: None,
        has_output_report: false,
    }];
    let attach = broker.attach_device(1, 0x046D, 0xC52B, Some("mouse".into()), None, Some(3), collections).unwrap();
    assert_eq!(attach.device_id, 1);
    assert!(broker.is_attached(1));

    broker.forward_input_report(HidInputReport { device_id: 1, report_id: 0, data: vec![1, 2, 3], ts_ms: Some(1) });
    assert!(broker.drain_fallback_reports().is_empty());
    assert!(!input_ring.is_empty());

    broker.detach_device(1);
    assert!(!broker.is_attached(1));
    assert!(!broker.has_listener(1));

    // Port freed: a second device can claim it.
    broker.attach_device(2, 1, 1, None, None, Some(3), vec![]).unwrap();
}

#[test]
fn reports_fall_back_to_queue_before_rings_are_attached() {
    let mut broker = HidBroker::new();
    broker.attach_device(1, 0, 0, None, None, None, vec![]).unwrap();
    broker.forward_input_report(HidInputReport { device_id: 1, report_id: 0, data: vec![9], ts_ms: None });
    let drained = broker.drain_fallback_reports();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].data, vec![9]);
}
