//! Cursor overlay descriptor. Same seqlock lifecycle as `ScanoutDescriptor`
//! (spec §3 "CursorState").

use crate::format::PixelFormat;
use vm_core::seqlock::{Seqlock, SnapshotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorFields {
    pub enable: bool,
    pub x: i32,
    pub y: i32,
    pub hot_x: i32,
    pub hot_y: i32,
    pub width: u32,
    pub height: u32,
    pub pitch_bytes: u32,
    pub format: PixelFormat,
    pub base_paddr: u64,
}

impl CursorFields {
    /// Top-left of the cursor surface on screen: `(x - hot_x, y - hot_y)`,
    /// which may fall outside the visible area in either direction.
    pub fn origin(&self) -> (i64, i64) {
        (self.x as i64 - self.hot_x as i64, self.y as i64 - self.hot_y as i64)
    }
}

// Word indices into the Seqlock<11> array. Word 0 of the wire layout
// (GENERATION) is the seqlock's own generation counter; these are words
// 1..11.
const ENABLE: usize = 0;
const X: usize = 1;
const Y: usize = 2;
const HOT_X: usize = 3;
const HOT_Y: usize = 4;
const WIDTH: usize = 5;
const HEIGHT: usize = 6;
const PITCH_BYTES: usize = 7;
const FORMAT: usize = 8;
const BASE_LO: usize = 9;
const BASE_HI: usize = 10;

#[derive(Default)]
pub struct CursorDescriptor(Seqlock<11>);

impl CursorDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, fields: CursorFields) {
        let mut words = [0u32; 11];
        words[ENABLE] = fields.enable as u32;
        words[X] = fields.x as u32;
        words[Y] = fields.y as u32;
        words[HOT_X] = fields.hot_x as u32;
        words[HOT_Y] = fields.hot_y as u32;
        words[WIDTH] = fields.width;
        words[HEIGHT] = fields.height;
        words[PITCH_BYTES] = fields.pitch_bytes;
        words[FORMAT] = fields.format as u32;
        words[BASE_LO] = fields.base_paddr as u32;
        words[BASE_HI] = (fields.base_paddr >> 32) as u32;
        self.0.publish(words);
    }

    pub fn snapshot(&self, retry_bound: u32) -> CursorSnapshot {
        match self.0.snapshot(retry_bound) {
            SnapshotResult::Valid(words) => match PixelFormat::from_u32(words[FORMAT]) {
                Some(format) => CursorSnapshot::Valid(CursorFields {
                    enable: words[ENABLE] != 0,
                    x: words[X] as i32,
                    y: words[Y] as i32,
                    hot_x: words[HOT_X] as i32,
                    hot_y: words[HOT_Y] as i32,
                    width: words[WIDTH],
                    height: words[HEIGHT],
                    pitch_bytes: words[PITCH_BYTES],
                    format,
                    base_paddr: (words[BASE_LO] as u64) | ((words[BASE_HI] as u64) << 32),
                }),
                None => CursorSnapshot::InvalidFormat,
            },
            SnapshotResult::WriterStuck { retries } => CursorSnapshot::WriterStuck { retries },
            SnapshotResult::StaleRetry => unreachable!("Seqlock::snapshot never returns StaleRetry"),
        }
    }

    #[doc(hidden)]
    pub fn force_generation_for_test(&self, value: u32) {
        self.0.force_generation_for_test(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorSnapshot {
    Valid(CursorFields),
    WriterStuck { retries: u32 },
    InvalidFormat,
}

/// On a writer-stuck or disabled cursor, the GPU worker treats the cursor
/// as absent (spec §7 "cursor -> disabled").
impl CursorSnapshot {
    pub fn enabled_fields(&self) -> Option<CursorFields> {
        match self {
            CursorSnapshot::Valid(f) if f.enable => Some(*f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_snapshot_round_trips() {
        let desc = CursorDescriptor::new();
        let fields = CursorFields {
            enable: true,
            x: 10,
            y: -5,
            hot_x: 1,
            hot_y: 1,
            width: 32,
            height: 32,
            pitch_bytes: 128,
            format: PixelFormat::B8G8R8A8,
            base_paddr: 0x2000,
        };
        desc.publish(fields);
        assert_eq!(desc.snapshot(128), CursorSnapshot::Valid(fields));
    }

    #[test]
    fn negative_origin_when_hot_exceeds_position() {
        let fields = CursorFields {
            enable: true,
            x: 0,
            y: 0,
            hot_x: 1,
            hot_y: 0,
            width: 2,
            height: 1,
            pitch_bytes: 8,
            format: PixelFormat::B8G8R8X8,
            base_paddr: 0,
        };
        assert_eq!(fields.origin(), (-1, 0));
    }
}
