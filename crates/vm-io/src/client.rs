//! CPU-side transport client: issue requests, poll for out-of-order
//! responses, and track stuck calls (spec §4.3).

use crate::protocol::{Request, RequestKind, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use vm_core::error::VmResult;
use vm_core::ring::RingBuffer;

pub struct IoClient {
    request_ring: Arc<RingBuffer>,
    response_ring: Arc<RingBuffer>,
    next_correlation_id: AtomicU64,
    pending: Mutex<HashMap<u64, Response>>,
}

impl IoClient {
    pub fn new(request_ring: Arc<RingBuffer>, response_ring: Arc<RingBuffer>) -> Self {
        Self { request_ring, response_ring, next_correlation_id: AtomicU64::new(1), pending: Mutex::new(HashMap::new()) }
    }

    /// Push a request record. Returns the correlation id to match the
    /// eventual response against, or `BackPressure` if the request ring is
    /// full (spec §4.3 "Failure" — caller retries with backoff).
    pub fn issue(&self, kind: RequestKind) -> VmResult<u64> {
        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { correlation_id, kind };
        self.request_ring.try_push_slice(&request.encode())?;
        Ok(correlation_id)
    }

    /// Drain every available response record into the pending map.
    /// Malformed records are dropped and logged (protocol violations never
    /// take down the caller).
    pub fn poll(&self) {
        let mut pending = self.pending.lock().expect("io client pending mutex poisoned");
        while let Some(record) = self.response_ring.pop() {
            match Response::decode(&record) {
                Ok(response) => {
                    pending.insert(response.correlation_id, response);
                }
                Err(err) => tracing::warn!(%err, "vm-io: dropping malformed response record"),
            }
        }
    }

    /// Take a matching response if it has arrived, polling first.
    pub fn try_recv(&self, correlation_id: u64) -> Option<Response> {
        self.poll();
        self.pending.lock().expect("io client pending mutex poisoned").remove(&correlation_id)
    }
}

/// Tracks in-flight calls by the tick they were issued on, so the CPU loop
/// can detect a stuck I/O worker without depending on wall-clock time
/// (spec §4.3 "Missing response after a configurable deadline").
#[derive(Default)]
pub struct PendingCalls {
    issued_at_tick: HashMap<u64, u64>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, correlation_id: u64, issued_tick: u64) {
        self.issued_at_tick.insert(correlation_id, issued_tick);
    }

    pub fn resolve(&mut self, correlation_id: u64) {
        self.issued_at_tick.remove(&correlation_id);
    }

    /// Correlation ids issued more than `deadline_ticks` ago as of `now`.
    pub fn stuck(&self, now: u64, deadline_ticks: u64) -> Vec<u64> {
        self.issued_at_tick
            .iter()
            .filter(|&(_, &issued)| now.saturating_sub(issued) > deadline_ticks)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.issued_at_tick.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseKind;

    #[test]
    fn issue_then_server_pushes_response_then_client_receives() {
        let req_ring = Arc::new(RingBuffer::new(256));
        let resp_ring = Arc::new(RingBuffer::new(256));
        let client = IoClient::new(req_ring.clone(), resp_ring.clone());
        let id = client.issue(RequestKind::PortRead { port: 0x60, size: 1 }).unwrap();

        let record = req_ring.pop().unwrap();
        let request = Request::decode(&record).unwrap();
        assert_eq!(request.correlation_id, id);

        let response = Response { correlation_id: id, kind: ResponseKind::Value(0x42) };
        resp_ring.try_push_slice(&response.encode()).unwrap();

        assert_eq!(client.try_recv(id), Some(response));
        assert_eq!(client.try_recv(id), None);
    }

    #[test]
    fn responses_can_arrive_out_of_order() {
        let req_ring = Arc::new(RingBuffer::new(256));
        let resp_ring = Arc::new(RingBuffer::new(256));
        let client = IoClient::new(req_ring, resp_ring.clone());
        let first = Response { correlation_id: 2, kind: ResponseKind::Ack };
        let second = Response { correlation_id: 1, kind: ResponseKind::Ack };
        resp_ring.try_push_slice(&first.encode()).unwrap();
        resp_ring.try_push_slice(&second.encode()).unwrap();
        assert_eq!(client.try_recv(1), Some(second));
        assert_eq!(client.try_recv(2), Some(first));
    }

    #[test]
    fn stuck_calls_detected_after_deadline() {
        let mut pending = PendingCalls::new();
        pending.track(1, 10);
        assert!(pending.stuck(15, 10).is_empty());
        assert_eq!(pending.stuck(21, 10), vec![1]);
        pending.resolve(1);
        assert_eq!(pending.pending_count(), 0);
    }
}
