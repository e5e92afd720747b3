//! GPU command submission ring, fence completion, and pending-submission
//! retirement (spec §4.4.1, §6 "GPU submission descriptor").

use vm_core::error::{VmError, VmResult};
use vm_core::ring::RingBuffer;

/// One allocation entry in a submission descriptor's variable-length
/// allocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub handle: u64,
    pub gpa: u64,
    pub size: u32,
    pub reserved: u32,
}

/// The guest/VRAM-resident submission descriptor a driver writes before
/// pushing a `Submit` ring entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDescriptor {
    pub version: u32,
    pub ty: u32,
    pub fence: u32,
    pub dma_buffer_gpa: u64,
    pub dma_buffer_size: u32,
    pub allocations: Vec<Allocation>,
}

const DESC_HEADER_LEN: usize = 4 + 4 + 4 + 4 + 8 + 4 + 4; // version,type,fence,reserved0,dma_gpa,dma_size,count
const ALLOC_LEN: usize = 8 + 8 + 4 + 4;

impl SubmissionDescriptor {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DESC_HEADER_LEN + self.allocations.len() * ALLOC_LEN);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.ty.to_le_bytes());
        out.extend_from_slice(&self.fence.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved0
        out.extend_from_slice(&self.dma_buffer_gpa.to_le_bytes());
        out.extend_from_slice(&self.dma_buffer_size.to_le_bytes());
        out.extend_from_slice(&(self.allocations.len() as u32).to_le_bytes());
        for a in &self.allocations {
            out.extend_from_slice(&a.handle.to_le_bytes());
            out.extend_from_slice(&a.gpa.to_le_bytes());
            out.extend_from_slice(&a.size.to_le_bytes());
            out.extend_from_slice(&a.reserved.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() < DESC_HEADER_LEN {
            return Err(VmError::ProtocolViolation("submission descriptor too short".into()));
        }
        let u32_at = |o: usize| u32::from_le_bytes(bytes[o..o + 4].try_into().unwrap());
        let u64_at = |o: usize| u64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        let version = u32_at(0);
        let ty = u32_at(4);
        let fence = u32_at(8);
        let dma_buffer_gpa = u64_at(16);
        let dma_buffer_size = u32_at(24);
        let allocation_count = u32_at(28) as usize;
        let need = DESC_HEADER_LEN + allocation_count * ALLOC_LEN;
        if bytes.len() < need {
            return Err(VmError::ProtocolViolation(format!(
                "submission descriptor truncated: need {need} bytes, have {}",
                bytes.len()
            )));
        }
        let mut allocations = Vec::with_capacity(allocation_count);
        for i in 0..allocation_count {
            let base = DESC_HEADER_LEN + i * ALLOC_LEN;
            allocations.push(Allocation {
                handle: u64_at(base),
                gpa: u64_at(base + 8),
                size: u32_at(base + 16),
                reserved: u32_at(base + 20),
            });
        }
        Ok(Self { version, ty, fence, dma_buffer_gpa, dma_buffer_size, allocations })
    }
}

/// The fixed-size ring entry pushed to the doorbell ring (spec §3 "Ring
/// Entry (GPU submission)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingEntry {
    Submit { flags: u32, fence: u32, desc_size: u32, desc_gpa: u64 },
}

const ENTRY_KIND_SUBMIT: u32 = 0;
const ENTRY_LEN: usize = 4 + 4 + 4 + 4 + 8; // kind,flags,fence,desc_size,desc_gpa

impl RingEntry {
    fn encode(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        match self {
            RingEntry::Submit { flags, fence, desc_size, desc_gpa } => {
                out[0..4].copy_from_slice(&ENTRY_KIND_SUBMIT.to_le_bytes());
                out[4..8].copy_from_slice(&flags.to_le_bytes());
                out[8..12].copy_from_slice(&fence.to_le_bytes());
                out[12..16].copy_from_slice(&desc_size.to_le_bytes());
                out[16..24].copy_from_slice(&desc_gpa.to_le_bytes());
            }
        }
        out
    }

    fn decode(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() != ENTRY_LEN {
            return Err(VmError::ProtocolViolation("malformed ring entry length".into()));
        }
        let kind = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        match kind {
            ENTRY_KIND_SUBMIT => Ok(RingEntry::Submit {
                flags: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
                fence: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
                desc_size: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
                desc_gpa: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            }),
            other => Err(VmError::ProtocolViolation(format!("unknown ring entry kind {other}"))),
        }
    }
}

/// Thin wrapper pairing a [`RingBuffer`] with submission entry
/// encode/decode.
pub struct SubmissionRing(RingBuffer);

impl SubmissionRing {
    pub fn new(capacity: usize) -> Self {
        Self(RingBuffer::new(capacity))
    }

    pub fn push(&self, entry: RingEntry) -> VmResult<()> {
        self.0.try_push_slice(&entry.encode())
    }

    pub fn pop(&self) -> VmResult<Option<RingEntry>> {
        match self.0.pop() {
            Some(record) => RingEntry::decode(&record).map(Some),
            None => Ok(None),
        }
    }
}

/// A submission the GPU worker has accepted but not yet retired.
struct Pending {
    fence: u32,
    dma_buffer_gpa: u64,
    desc_gpa: u64,
}

/// Tracks in-flight submissions and frees their bookkeeping once
/// `fence_completed` advances past them (spec §4.4.1 "Retirement").
#[derive(Default)]
pub struct PendingSubmissions {
    entries: Vec<Pending>,
}

impl PendingSubmissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly-accepted submission. Fails with `ResourceExhausted`
    /// if the caller-supplied limit would be exceeded, without mutating
    /// state (spec §7 "do not leak prior allocations").
    pub fn push(&mut self, fence: u32, dma_buffer_gpa: u64, desc_gpa: u64, max_pending: usize) -> VmResult<()> {
        if self.entries.len() >= max_pending {
            return Err(VmError::ResourceExhausted(format!(
                "pending submission list full ({max_pending} entries)"
            )));
        }
        self.entries.push(Pending { fence, dma_buffer_gpa, desc_gpa });
        Ok(())
    }

    /// Drain and return every submission whose `fence <= fence_completed`.
    /// The caller is responsible for actually freeing the referenced DMA
    /// and descriptor buffers.
    pub fn retire(&mut self, fence_completed: u32) -> Vec<(u64, u64)> {
        let mut retired = Vec::new();
        self.entries.retain(|p| {
            if p.fence <= fence_completed {
                retired.push((p.dma_buffer_gpa, p.desc_gpa));
                false
            } else {
                true
            }
        });
        retired
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_descriptor_round_trips_with_allocations() {
        let desc = SubmissionDescriptor {
            version: 1,
            ty: 0,
            fence: 42,
            dma_buffer_gpa: 0x1000,
            dma_buffer_size: 4096,
            allocations: vec![
                Allocation { handle: 1, gpa: 0x2000, size: 64, reserved: 0 },
                Allocation { handle: 2, gpa: 0x3000, size: 128, reserved: 0 },
            ],
        };
        let encoded = desc.encode();
        assert_eq!(SubmissionDescriptor::decode(&encoded).unwrap(), desc);
    }

    #[test]
    fn ring_entry_round_trips_through_ring_buffer() {
        let ring = SubmissionRing::new(256);
        let entry = RingEntry::Submit { flags: 0, fence: 7, desc_size: 64, desc_gpa: 0xABCD };
        ring.push(entry).unwrap();
        assert_eq!(ring.pop().unwrap(), Some(entry));
        assert_eq!(ring.pop().unwrap(), None);
    }

    #[test]
    fn retirement_drains_only_completed_fences() {
        let mut pending = PendingSubmissions::new();
        pending.push(1, 0x1000, 0x2000, 16).unwrap();
        pending.push(2, 0x1100, 0x2100, 16).unwrap();
        pending.push(3, 0x1200, 0x2200, 16).unwrap();
        let retired = pending.retire(2);
        assert_eq!(retired.len(), 2);
        assert_eq!(pending.pending_count(), 1);
    }

    #[test]
    fn resource_exhaustion_does_not_leak_prior_entries() {
        let mut pending = PendingSubmissions::new();
        pending.push(1, 0, 0, 1).unwrap();
        let err = pending.push(2, 0, 0, 1).unwrap_err();
        assert!(matches!(err, VmError::ResourceExhausted(_)));
        assert_eq!(pending.pending_count(), 1);
    }
}
