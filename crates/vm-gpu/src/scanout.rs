//! Scanout descriptor: the seqlock mailbox the GPU worker samples every
//! frame to find out what the driver wants displayed. See spec §3
//! "ScanoutState" and §6 "ScanoutState word layout".

use crate::format::PixelFormat;
use vm_core::seqlock::{Seqlock, SnapshotResult};

/// `SOURCE` word values (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanoutSource {
    LegacyVbeLfb,
    ModernDriver,
}

impl ScanoutSource {
    fn from_word(w: u32) -> Self {
        if w == 1 { ScanoutSource::ModernDriver } else { ScanoutSource::LegacyVbeLfb }
    }
    fn to_word(self) -> u32 {
        match self {
            ScanoutSource::LegacyVbeLfb => 0,
            ScanoutSource::ModernDriver => 1,
        }
    }
}

/// A fully decoded `ScanoutState` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanoutFields {
    pub source: ScanoutSource,
    pub base_paddr: u64,
    pub width: u32,
    pub height: u32,
    pub pitch_bytes: u32,
    pub format: PixelFormat,
}

impl ScanoutFields {
    /// `pitch_bytes*(height-1) + width*bytes_per_pixel`, the minimum span
    /// the readback path must be able to read (spec §4.4.2 — never require
    /// the trailing pitch padding of the last row).
    pub fn required_span(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        self.pitch_bytes as usize * (self.height as usize - 1) + row_bytes
    }
}

// Field indices into the underlying Seqlock<7> array. The wire layout in
// spec §6 additionally lists GENERATION as word 0; that word is the
// seqlock's own generation counter (vm_core::seqlock::Seqlock), so it is
// not duplicated here — `ScanoutDescriptor::generation()` is word 0 of the
// wire layout, and these indices are words 1..7.
const SOURCE: usize = 0;
const BASE_LO: usize = 1;
const BASE_HI: usize = 2;
const WIDTH: usize = 3;
const HEIGHT: usize = 4;
const PITCH_BYTES: usize = 5;
const FORMAT: usize = 6;

/// Seqlock-protected scanout mailbox. One writer (the driver-facing device
/// model in the I/O worker), many readers (the GPU worker, the debug
/// escape channel).
#[derive(Default)]
pub struct ScanoutDescriptor(Seqlock<7>);

impl ScanoutDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, fields: ScanoutFields) {
        let mut words = [0u32; 7];
        words[SOURCE] = fields.source.to_word();
        words[BASE_LO] = fields.base_paddr as u32;
        words[BASE_HI] = (fields.base_paddr >> 32) as u32;
        words[WIDTH] = fields.width;
        words[HEIGHT] = fields.height;
        words[PITCH_BYTES] = fields.pitch_bytes;
        words[FORMAT] = fields.format as u32;
        self.0.publish(words);
    }

    /// Snapshot the descriptor. Returns `None` when the writer is stuck
    /// (caller should substitute the stub described in spec §4.4.4) or
    /// when the format word is unrecognized (a protocol violation that
    /// should not crash the worker).
    pub fn snapshot(&self, retry_bound: u32) -> ScanoutSnapshot {
        match self.0.snapshot(retry_bound) {
            SnapshotResult::Valid(words) => match PixelFormat::from_u32(words[FORMAT]) {
                Some(format) => ScanoutSnapshot::Valid(ScanoutFields {
                    source: ScanoutSource::from_word(words[SOURCE]),
                    base_paddr: (words[BASE_LO] as u64) | ((words[BASE_HI] as u64) << 32),
                    width: words[WIDTH],
                    height: words[HEIGHT],
                    pitch_bytes: words[PITCH_BYTES],
                    format,
                }),
                None => ScanoutSnapshot::InvalidFormat,
            },
            SnapshotResult::WriterStuck { retries } => ScanoutSnapshot::WriterStuck { retries },
            SnapshotResult::StaleRetry => unreachable!("Seqlock::snapshot never returns StaleRetry"),
        }
    }

    #[doc(hidden)]
    pub fn force_generation_for_test(&self, value: u32) {
        self.0.force_generation_for_test(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanoutSnapshot {
    Valid(ScanoutFields),
    WriterStuck { retries: u32 },
    InvalidFormat,
}
