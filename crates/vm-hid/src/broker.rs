//! The HID broker: owns the `HidDevice <-> DeviceId` mapping and the
//! attach/detach lifecycle, with rollback on partial failure (spec §4.6).

use crate::collection::{has_interrupt_out, validate_collections, Collection};
use crate::protocol::{HidAttach, HidDetach, HidInputReport, HidSendReport, ReportType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use vm_core::error::{VmError, VmResult};
use vm_core::ring::RingBuffer;

/// Where an attached host device's outbound (Output/Feature) reports
/// actually get delivered. Real device I/O is outside this crate's scope.
pub trait HostDevice: Send {
    fn send_report(&mut self, device_id: u64, report_id: u8, report_type: ReportType, data: &[u8]);
}

const DEFAULT_FALLBACK_CAPACITY: usize = 256;

#[derive(Default)]
pub struct HidBroker {
    registrations: HashMap<u64, HidAttach>,
    listeners_installed: HashSet<u64>,
    claimed_ports: HashSet<u32>,
    attached_to_worker: HashSet<u64>,
    input_ring: Option<Arc<RingBuffer>>,
    output_ring: Option<Arc<RingBuffer>>,
    fallback_queue: VecDeque<HidInputReport>,
    dropped_fallback: u64,
}

impl HidBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a dedicated shared ring pair, preferred over the copy-message
    /// fallback (spec §4.6 `hid.ringAttach`).
    pub fn attach_rings(&mut self, input_ring: Arc<RingBuffer>, output_ring: Arc<RingBuffer>) {
        self.input_ring = Some(input_ring);
        self.output_ring = Some(output_ring);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn attach_device(
        &mut self,
        device_id: u64,
        vendor_id: u16,
        product_id: u16,
        product_name: Option<String>,
        guest_path: Option<String>,
        guest_port: Option<u32>,
        collections: Vec<Collection>,
    ) -> VmResult<HidAttach> {
        validate_collections(&collections)?;

        self.listeners_installed.insert(device_id);

        if let Some(port) = guest_port {
            if self.claimed_ports.contains(&port) {
                self.listeners_installed.remove(&device_id);
                return Err(VmError::ResourceExhausted(format!("hid guest port {port} already claimed")));
            }
            self.claimed_ports.insert(port);
        }

        self.attached_to_worker.insert(device_id);

        let message = HidAttach {
            device_id,
            vendor_id,
            product_id,
            product_name,
            guest_path,
            guest_port,
            has_interrupt_out: has_interrupt_out(&collections),
            collections,
        };
        self.registrations.insert(device_id, message.clone());
        Ok(message)
    }

    /// Best-effort detach: always succeeds, clearing every trace of the
    /// device regardless of which attach steps actually ran (spec §4.6
    /// "unbridges cleanly").
    pub fn detach_device(&mut self, device_id: u64) -> HidDetach {
        self.listeners_installed.remove(&device_id);
        self.attached_to_worker.remove(&device_id);
        if let Some(registration) = self.registrations.remove(&device_id) {
            if let Some(port) = registration.guest_port {
                self.claimed_ports.remove(&port);
            }
        }
        HidDetach { device_id }
    }

    pub fn is_attached(&self, device_id: u64) -> bool {
        self.attached_to_worker.contains(&device_id)
    }

    /// How many devices are currently attached, for callers that need to
    /// distinguish "nothing to drain" from "something to drain but stuck"
    /// (spec §4.6).
    pub fn attached_count(&self) -> usize {
        self.attached_to_worker.len()
    }

    pub fn has_listener(&self, device_id: u64) -> bool {
        self.listeners_installed.contains(&device_id)
    }

    /// Forward an input report: via the shared ring when attached
    /// (preferred), else the bounded fallback queue (dropped and counted
    /// once full) (spec §4.6).
    pub fn forward_input_report(&mut self, report: HidInputReport) {
        if let Some(ring) = &self.input_ring {
            if ring.try_push_slice(&encode_input_report(&report)).is_ok() {
                return;
            }
        }
        if self.fallback_queue.len() >= DEFAULT_FALLBACK_CAPACITY {
            self.dropped_fallback += 1;
            return;
        }
        self.fallback_queue.push_back(report);
    }

    pub fn drain_fallback_reports(&mut self) -> Vec<HidInputReport> {
        self.fallback_queue.drain(..).collect()
    }

    pub fn dropped_fallback_count(&self) -> u64 {
        self.dropped_fallback
    }

    /// Drain the output ring (host-device-bound Output/Feature reports)
    /// and deliver them via `host` (spec §4.6 "drains on a short timer").
    pub fn drain_output_reports(&mut self, host: &mut dyn HostDevice) -> usize {
        let Some(ring) = &self.output_ring else { return 0 };
        let mut delivered = 0;
        while let Some(record) = ring.pop() {
            match decode_send_report(&record) {
                Ok(msg) => {
                    host.send_report(msg.device_id, msg.report_id, msg.report_type, &msg.data);
                    delivered += 1;
                }
                Err(err) => tracing::warn!(%err, "vm-hid: dropping malformed output report record"),
            }
        }
        delivered
    }
}

fn encode_input_report(report: &HidInputReport) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&report.device_id.to_le_bytes());
    out.push(report.report_id);
    out.extend_from_slice(&report.ts_ms.unwrap_or(0).to_le_bytes());
    out.push(report.ts_ms.is_some() as u8);
    out.extend_from_slice(&(report.data.len() as u32).to_le_bytes());
    out.extend_from_slice(&report.data);
    out
}

fn decode_send_report(bytes: &[u8]) -> VmResult<HidSendReport> {
    if bytes.len() < 14 {
        return Err(VmError::ProtocolViolation("hid send-report record too short".into()));
    }
    let device_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let report_id = bytes[8];
    let report_type = match bytes[9] {
        0 => ReportType::Output,
        1 => ReportType::Feature,
        other => return Err(VmError::ProtocolViolation(format!("unknown hid report type {other}"))),
    };
    let len = u32::from_le_bytes(bytes[10..14].try_into().unwrap()) as usize;
    if bytes.len() < 14 + len {
        return Err(VmError::ProtocolViolation("hid send-report record truncated".into()));
    }
    Ok(HidSendReport { device_id, report_id, report_type, data: bytes[14..14 + len].to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_collections() -> Vec<Collection> {
        vec![Collection { report_id: None, is_range: false, range_start: None, range_end: None, has_output_report: true }]
    }

    #[test]
    fn attach_then_detach_leaves_no_trace() {
        let mut broker = HidBroker::new();
        broker.attach_device(1, 0x046D, 0xC52B, None, None, Some(7), ok_collections()).unwrap();
        assert!(broker.is_attached(1));
        assert!(broker.has_listener(1));
        assert_eq!(broker.attached_count(), 1);
        broker.detach_device(1);
        assert!(!broker.is_attached(1));
        assert!(!broker.has_listener(1));
        assert_eq!(broker.attached_count(), 0);
        // port released: re-attaching another device to the same port succeeds
        broker.attach_device(2, 1, 1, None, None, Some(7), ok_collections()).unwrap();
    }

    #[test]
    fn attach_rejects_invalid_collections_without_installing_anything() {
        let mut broker = HidBroker::new();
        let bad = vec![
            Collection { report_id: Some(1), is_range: false, range_start: None, range_end: None, has_output_report: false },
            Collection { report_id: None, is_range: false, range_start: None, range_end: None, has_output_report: false },
        ];
        let err = broker.attach_device(1, 0, 0, None, None, None, bad).unwrap_err();
        assert!(matches!(err, VmError::ProtocolViolation(_)));
        assert!(!broker.has_listener(1));
    }

    #[test]
    fn attach_rolls_back_listener_on_port_conflict() {
        let mut broker = HidBroker::new();
        broker.attach_device(1, 0, 0, None, None, Some(5), ok_collections()).unwrap();
        let err = broker.attach_device(2, 0, 0, None, None, Some(5), ok_collections()).unwrap_err();
        assert!(matches!(err, VmError::ResourceExhausted(_)));
        assert!(!broker.has_listener(2));
        assert!(!broker.is_attached(2));
    }

    #[test]
    fn has_interrupt_out_flows_into_attach_message() {
        let mut broker = HidBroker::new();
        let msg = broker.attach_device(1, 0, 0, None, None, None, ok_collections()).unwrap();
        assert!(msg.has_interrupt_out);
    }

    #[test]
    fn fallback_queue_drops_and_counts_once_full() {
        let mut broker = HidBroker::new();
        for i in 0..(DEFAULT_FALLBACK_CAPACITY + 5) {
            broker.forward_input_report(HidInputReport { device_id: 1, report_id: 0, data: vec![i as u8], ts_ms: None });
        }
        assert_eq!(broker.dropped_fallback_count(), 5);
        assert_eq!(broker.drain_fallback_reports().len(), DEFAULT_FALLBACK_CAPACITY);
    }

    #[test]
    fn ring_preferred_when_attached() {
        let mut broker = HidBroker::new();
        let input = Arc::new(RingBuffer::new(256));
        let output = Arc::new(RingBuffer::new(256));
        broker.attach_rings(input.clone(), output);
        broker.forward_input_report(HidInputReport { device_id: 1, report_id: 0, data: vec![9], ts_ms: None });
        assert!(broker.drain_fallback_reports().is_empty());
        assert!(input.pop().is_some());
    }

    struct RecordingHost {
        received: Vec<(u64, u8, ReportType, Vec<u8>)>,
    }

    impl HostDevice for RecordingHost {
        fn send_report(&mut self, device_id: u64, report_id: u8, report_type: ReportType, data: &[u8]) {
            self.received.push((device_id, report_id, report_type, data.to_vec()));
        }
    }

    #[test]
    fn output_ring_drains_into_host_device() {
        let mut broker = HidBroker::new();
        let input = Arc::new(RingBuffer::new(256));
        let output = Arc::new(RingBuffer::new(256));
        let msg = HidSendReport { device_id: 3, report_id: 1, report_type: ReportType::Feature, data: vec![1, 2, 3] };
        output.try_push_slice(&super::encode_send_report_for_test(&msg)).unwrap();
        broker.attach_rings(input, output);
        let mut host = RecordingHost { received: Vec::new() };
        assert_eq!(broker.drain_output_reports(&mut host), 1);
        assert_eq!(host.received, vec![(3, 1, ReportType::Feature, vec![1, 2, 3])]);
    }
}

#[cfg(test)]
fn encode_send_report_for_test(msg: &HidSendReport) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&msg.device_id.to_le_bytes());
    out.push(msg.report_id);
    out.push(match msg.report_type {
        ReportType::Output => 0,
        ReportType::Feature => 1,
    });
    out.extend_from_slice(&(msg.data.len() as u32).to_le_bytes());
    out.extend_from_slice(&msg.data);
    out
}
