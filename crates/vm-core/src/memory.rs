//! Shared guest physical memory and the VRAM aperture.
//!
//! Addresses in `[VRAM_BASE, VRAM_BASE + VRAM_SIZE)` resolve to the VRAM
//! shared region; everything else resolves to guest RAM. See spec §3 and
//! §6 "Guest physical address space".

use crate::error::{VmError, VmResult};
use std::cell::UnsafeCell;

/// A raw, fixed-size byte region shared across worker threads.
///
/// Like [`crate::ring::RingBuffer`], synchronization is the caller's
/// responsibility: callers either go through the seqlock/ring primitives
/// (which carry their own ordering) or accept racy reads on plain RAM,
/// matching "Shared-resource discipline" in spec §5.
pub struct SharedRegion {
    bytes: UnsafeCell<Box<[u8]>>,
    len: usize,
}

unsafe impl Sync for SharedRegion {}
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    pub fn new(len: usize) -> Self {
        Self { bytes: UnsafeCell::new(vec![0u8; len].into_boxed_slice()), len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Safety: the caller must ensure no other thread is concurrently
    /// writing the same byte range.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { &*self.bytes.get() }
    }

    /// Safety: the caller must ensure exclusive access to the byte range
    /// being written (single-writer-per-region discipline, spec §5).
    #[allow(clippy::mut_from_ref)]
    pub fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { &mut *self.bytes.get() }
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> VmResult<()> {
        let end = offset.checked_add(out.len()).ok_or_else(|| {
            VmError::ProtocolViolation("address overflow on read".into())
        })?;
        if end > self.len {
            return Err(VmError::ProtocolViolation(format!(
                "read out of bounds: [{offset}, {end}) exceeds region of {} bytes",
                self.len
            )));
        }
        out.copy_from_slice(&self.as_slice()[offset..end]);
        Ok(())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> VmResult<()> {
        let end = offset.checked_add(data.len()).ok_or_else(|| {
            VmError::ProtocolViolation("address overflow on write".into())
        })?;
        if end > self.len {
            return Err(VmError::ProtocolViolation(format!(
                "write out of bounds: [{offset}, {end}) exceeds region of {} bytes",
                self.len
            )));
        }
        self.as_mut_slice()[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// Which backing region a guest physical address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    GuestRam,
    Vram,
}

/// Guest physical memory plus the optional BAR1 VRAM aperture, and the
/// address-resolution rule that ties them together.
pub struct GuestAddressSpace {
    pub ram: SharedRegion,
    pub vram: Option<SharedRegion>,
    pub vram_base: u64,
}

impl GuestAddressSpace {
    pub fn new(ram_size: usize) -> Self {
        Self { ram: SharedRegion::new(ram_size), vram: None, vram_base: 0 }
    }

    pub fn with_vram(mut self, vram_base: u64, vram_size: usize) -> Self {
        self.vram = Some(SharedRegion::new(vram_size));
        self.vram_base = vram_base;
        self
    }

    /// Resolve a guest physical address to `(region, offset_within_region)`.
    pub fn resolve(&self, paddr: u64) -> VmResult<(AddressSpace, usize)> {
        if let Some(vram) = &self.vram {
            let vram_end = self.vram_base + vram.len() as u64;
            if paddr >= self.vram_base && paddr < vram_end {
                return Ok((AddressSpace::Vram, (paddr - self.vram_base) as usize));
            }
        }
        if paddr >= self.ram.len() as u64 {
            return Err(VmError::ProtocolViolation(format!(
                "guest physical address {paddr:#x} outside ram ({} bytes) and vram",
                self.ram.len()
            )));
        }
        Ok((AddressSpace::GuestRam, paddr as usize))
    }

    /// Resolve `paddr` and read `len` bytes from the backing region. Used
    /// by the GPU readback path (spec §4.4.2): the caller asks for exactly
    /// the pixel bytes it needs, never the trailing pitch padding.
    pub fn read_span(&self, paddr: u64, len: usize) -> VmResult<Vec<u8>> {
        let (space, offset) = self.resolve(paddr)?;
        let region = match space {
            AddressSpace::GuestRam => &self.ram,
            AddressSpace::Vram => self.vram.as_ref().expect("resolved to vram without one mapped"),
        };
        let end = offset.checked_add(len).ok_or_else(|| {
            VmError::ProtocolViolation("address overflow on span read".into())
        })?;
        if end > region.len() {
            return Err(VmError::ProtocolViolation(format!(
                "span [{paddr:#x}, +{len}) crosses out of its backing region"
            )));
        }
        Ok(region.as_slice()[offset..end].to_vec())
    }
}
