//! GPU BAR0 MMIO register map (spec §6 "GPU MMIO registers").

use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! registers {
    ($($name:ident = $offset:expr),* $(,)?) => {
        $(pub const $name: usize = $offset;)*
        pub const REGISTER_COUNT: usize = { let mut max = 0usize; $(if $offset > max { max = $offset; })* (max / 4) + 1 };
    };
}

registers! {
    MAGIC = 0x00,
    VERSION = 0x04,
    SCANOUT_FB_LO = 0x08,
    SCANOUT_FB_HI = 0x0C,
    SCANOUT_PITCH = 0x10,
    SCANOUT_WIDTH = 0x14,
    SCANOUT_HEIGHT = 0x18,
    SCANOUT_FORMAT = 0x1C,
    SCANOUT_ENABLE = 0x20,
    RING_BASE_LO = 0x24,
    RING_BASE_HI = 0x28,
    RING_ENTRY_COUNT = 0x2C,
    RING_HEAD = 0x30,
    RING_TAIL = 0x34,
    RING_DOORBELL = 0x38,
    INT_STATUS = 0x3C,
    INT_ACK = 0x40,
    FENCE_COMPLETED = 0x44,
}

pub const GPU_MAGIC: u32 = 0x5245_4147; // "GAER"
pub const GPU_VERSION: u32 = 1;

pub const INT_FENCE: u32 = 1 << 0;
pub const INT_SCANOUT_VBLANK: u32 = 1 << 1;
pub const INT_ERROR: u32 = 1 << 31;

/// Word-addressed MMIO register file for BAR0.
pub struct GpuMmio {
    words: Vec<AtomicU32>,
}

impl Default for GpuMmio {
    fn default() -> Self {
        let words: Vec<AtomicU32> = (0..REGISTER_COUNT).map(|_| AtomicU32::new(0)).collect();
        words[MAGIC / 4].store(GPU_MAGIC, Ordering::Relaxed);
        words[VERSION / 4].store(GPU_VERSION, Ordering::Relaxed);
        Self { words }
    }
}

impl GpuMmio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, offset: usize) -> u32 {
        self.words[offset / 4].load(Ordering::Acquire)
    }

    pub fn write(&self, offset: usize, value: u32) {
        self.words[offset / 4].store(value, Ordering::Release);
    }

    pub fn raise_interrupt(&self, bits: u32) {
        self.words[INT_STATUS / 4].fetch_or(bits, Ordering::AcqRel);
    }

    pub fn ack_interrupt(&self, bits: u32) {
        self.words[INT_STATUS / 4].fetch_and(!bits, Ordering::AcqRel);
        self.words[INT_ACK / 4].fetch_or(bits, Ordering::AcqRel);
    }

    pub fn interrupt_status(&self) -> u32 {
        self.words[INT_STATUS / 4].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_and_version_are_preset() {
        let mmio = GpuMmio::new();
        assert_eq!(mmio.read(MAGIC), GPU_MAGIC);
        assert_eq!(mmio.read(VERSION), GPU_VERSION);
    }

    #[test]
    fn interrupt_raise_and_ack() {
        let mmio = GpuMmio::new();
        mmio.raise_interrupt(INT_FENCE | INT_SCANOUT_VBLANK);
        assert_eq!(mmio.interrupt_status(), INT_FENCE | INT_SCANOUT_VBLANK);
        mmio.ack_interrupt(INT_FENCE);
        assert_eq!(mmio.interrupt_status(), INT_SCANOUT_VBLANK);
    }
}
