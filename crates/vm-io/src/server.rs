//! I/O-worker side transport: dequeue requests, dispatch to a device
//! model, post responses (spec §4.3).

use crate::protocol::{Request, RequestKind, Response, ResponseKind};
use std::sync::Arc;
use vm_core::error::VmResult;
use vm_core::ring::RingBuffer;

/// The device-model dispatch surface a concrete machine wires up. Actual
/// device behavior (PIC, UART, disk controller, ...) lives outside this
/// crate; this trait is the seam.
pub trait DeviceModel: Send {
    fn port_read(&mut self, port: u16, size: u8) -> u32;
    fn port_write(&mut self, port: u16, size: u8, value: u32);
    fn mmio_read(&mut self, paddr: u64, size: u8) -> u64;
    fn mmio_write(&mut self, paddr: u64, size: u8, value: u64);
    fn serial_notify(&mut self, bytes: &[u8]);

    /// Whether writes to `port` are write-posted (no ack required) for
    /// this model (spec §4.3 "Ordering").
    fn port_write_is_posted(&self, _port: u16) -> bool {
        false
    }

    fn mmio_write_is_posted(&self, _paddr: u64) -> bool {
        false
    }
}

pub struct IoServer {
    request_ring: Arc<RingBuffer>,
    response_ring: Arc<RingBuffer>,
}

impl IoServer {
    pub fn new(request_ring: Arc<RingBuffer>, response_ring: Arc<RingBuffer>) -> Self {
        Self { request_ring, response_ring }
    }

    /// Dispatch every currently-queued request to `model`, posting a
    /// response for each one unless it was write-posted. Returns the
    /// number of requests processed.
    pub fn tick(&self, model: &mut dyn DeviceModel) -> VmResult<usize> {
        let mut processed = 0;
        while let Some(record) = self.request_ring.pop() {
            let request = match Request::decode(&record) {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(%err, "vm-io: dropping malformed request record");
                    continue;
                }
            };
            processed += 1;
            self.dispatch(model, request)?;
        }
        Ok(processed)
    }

    fn dispatch(&self, model: &mut dyn DeviceModel, request: Request) -> VmResult<()> {
        let correlation_id = request.correlation_id;
        match request.kind {
            RequestKind::PortRead { port, size } => {
                let value = model.port_read(port, size);
                self.respond(Response { correlation_id, kind: ResponseKind::Value(value as u64) })
            }
            RequestKind::PortWrite { port, size, value } => {
                model.port_write(port, size, value);
                if model.port_write_is_posted(port) {
                    Ok(())
                } else {
                    self.respond(Response { correlation_id, kind: ResponseKind::Ack })
                }
            }
            RequestKind::MmioRead { paddr, size } => {
                let value = model.mmio_read(paddr, size);
                self.respond(Response { correlation_id, kind: ResponseKind::Value(value) })
            }
            RequestKind::MmioWrite { paddr, size, value } => {
                model.mmio_write(paddr, size, value);
                if model.mmio_write_is_posted(paddr) {
                    Ok(())
                } else {
                    self.respond(Response { correlation_id, kind: ResponseKind::Ack })
                }
            }
            RequestKind::SerialNotify { bytes } => {
                model.serial_notify(&bytes);
                Ok(())
            }
        }
    }

    fn respond(&self, response: Response) -> VmResult<()> {
        self.response_ring.try_push_slice(&response.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IoClient;

    #[derive(Default)]
    struct FakeUart {
        last_write: Option<(u16, u32)>,
        serial_log: Vec<u8>,
    }

    impl DeviceModel for FakeUart {
        fn port_read(&mut self, port: u16, _size: u8) -> u32 {
            port as u32
        }
        fn port_write(&mut self, port: u16, _size: u8, value: u32) {
            self.last_write = Some((port, value));
        }
        fn mmio_read(&mut self, paddr: u64, _size: u8) -> u64 {
            paddr
        }
        fn mmio_write(&mut self, _paddr: u64, _size: u8, _value: u64) {}
        fn serial_notify(&mut self, bytes: &[u8]) {
            self.serial_log.extend_from_slice(bytes);
        }
    }

    #[test]
    fn port_read_round_trips_through_both_rings() {
        let req_ring = Arc::new(RingBuffer::new(256));
        let resp_ring = Arc::new(RingBuffer::new(256));
        let client = IoClient::new(req_ring.clone(), resp_ring.clone());
        let server = IoServer::new(req_ring, resp_ring);
        let mut model = FakeUart::default();

        let id = client.issue(crate::protocol::RequestKind::PortRead { port: 0x3F8, size: 1 }).unwrap();
        server.tick(&mut model).unwrap();
        let response = client.try_recv(id).unwrap();
        assert_eq!(response.kind, ResponseKind::Value(0x3F8));
    }

    #[test]
    fn serial_notify_is_write_posted_and_gets_no_response() {
        let req_ring = Arc::new(RingBuffer::new(256));
        let resp_ring = Arc::new(RingBuffer::new(256));
        let client = IoClient::new(req_ring.clone(), resp_ring.clone());
        let server = IoServer::new(req_ring, resp_ring);
        let mut model = FakeUart::default();

        let id = client.issue(crate::protocol::RequestKind::SerialNotify { bytes: b"hi".to_vec() }).unwrap();
        server.tick(&mut model).unwrap();
        assert_eq!(model.serial_log, b"hi");
        assert_eq!(client.try_recv(id), None);
    }
}
