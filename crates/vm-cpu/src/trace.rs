//! Instruction trace buffer: sample-rate decimation, drop-on-full, and the
//! flush triggers (size, time, pause) from SPEC_FULL §10.5.

use std::time::Duration;

const FLUSH_SIZE: usize = 64;
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Accumulates trace records between flushes. The caller supplies
/// elapsed time explicitly (`now`) so this stays deterministic and
/// testable, matching [`crate::worker`]'s no-wall-clock discipline.
pub struct TraceBuffer {
    enabled: bool,
    filter: Option<String>,
    sample_rate: u32,
    include_instructions: bool,
    include_port_io: bool,
    samples_seen: u32,
    records: Vec<Vec<u8>>,
    dropped: u64,
    capacity: usize,
    last_flush_at: Duration,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            enabled: false,
            filter: None,
            sample_rate: 1,
            include_instructions: true,
            include_port_io: true,
            samples_seen: 0,
            records: Vec::new(),
            dropped: 0,
            capacity,
            last_flush_at: Duration::ZERO,
        }
    }

    /// `sample_rate` is clamped to at least 1 (spec §4.5 "sample_rate >= 1,
    /// every N-th event kept"). `include_instructions`/`include_port_io`
    /// gate which event categories `record_instruction`/`record_port_io`
    /// accept.
    pub fn enable(&mut self, filter: String, sample_rate: u32, include_instructions: bool, include_port_io: bool) {
        self.enabled = true;
        self.filter = Some(filter);
        self.sample_rate = sample_rate.max(1);
        self.include_instructions = include_instructions;
        self.include_port_io = include_port_io;
        self.samples_seen = 0;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.filter = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Offer one instruction-step trace record, subject to
    /// `include_instructions` and the shared decimation/capacity rules.
    pub fn record_instruction(&mut self, record: Vec<u8>) {
        if self.include_instructions {
            self.offer(record);
        }
    }

    /// Offer one port-I/O trace record, subject to `include_port_io` and
    /// the shared decimation/capacity rules.
    pub fn record_port_io(&mut self, record: Vec<u8>) {
        if self.include_port_io {
            self.offer(record);
        }
    }

    /// Decimated by `sample_rate` (only every Nth offered record is kept
    /// across both categories); dropped (counted, not buffered) once
    /// `capacity` is reached.
    fn offer(&mut self, record: Vec<u8>) {
        if !self.enabled {
            return;
        }
        self.samples_seen += 1;
        if self.samples_seen % self.sample_rate != 0 {
            return;
        }
        if self.records.len() >= self.capacity {
            self.dropped += 1;
            return;
        }
        self.records.push(record);
    }

    /// Whether a flush should happen now: buffer full, the flush interval
    /// elapsed, or the caller is pausing.
    pub fn should_flush(&self, now: Duration, pausing: bool) -> bool {
        !self.records.is_empty()
            && (pausing || self.records.len() >= FLUSH_SIZE || now.saturating_sub(self.last_flush_at) >= FLUSH_INTERVAL)
    }

    /// Drain buffered records for a `TraceChunk` event.
    pub fn flush(&mut self, now: Duration) -> Vec<Vec<u8>> {
        self.last_flush_at = now;
        std::mem::take(&mut self.records)
    }
}
