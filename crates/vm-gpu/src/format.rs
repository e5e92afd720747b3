//! Pixel format decode to canonical linear `R8G8B8A8`.
//!
//! Every scanout/cursor surface format decodes to the same in-memory shape
//! so composition (§4.4.3) and screenshot readback (§4.4.4) never need to
//! know the original format again. See spec §4.4.2 for the format table.

use once_cell::sync::Lazy;

/// Surface pixel format, as carried in the `FORMAT` word of `ScanoutState`
/// / `CursorState` (spec §6). The numeric values are this crate's own
/// wire encoding — the spec enumerates formats by name, not by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PixelFormat {
    B8G8R8X8 = 0,
    B8G8R8A8 = 1,
    R8G8B8X8 = 2,
    R8G8B8A8 = 3,
    B8G8R8X8Srgb = 4,
    R8G8B8X8Srgb = 5,
    B8G8R8A8Srgb = 6,
    R8G8B8A8Srgb = 7,
    B5G6R5 = 8,
    B5G5R5A1 = 9,
}

impl PixelFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::B8G8R8X8,
            1 => Self::B8G8R8A8,
            2 => Self::R8G8B8X8,
            3 => Self::R8G8B8A8,
            4 => Self::B8G8R8X8Srgb,
            5 => Self::R8G8B8X8Srgb,
            6 => Self::B8G8R8A8Srgb,
            7 => Self::R8G8B8A8Srgb,
            8 => Self::B5G6R5,
            9 => Self::B5G5R5A1,
            _ => return None,
        })
    }

    /// Bytes per pixel in the source surface.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::B5G6R5 | PixelFormat::B5G5R5A1 => 2,
            _ => 4,
        }
    }

    /// True for formats with no meaningful source alpha channel (the
    /// decoded pixel's alpha is always forced to `0xFF`).
    pub fn is_x_variant(self) -> bool {
        matches!(
            self,
            PixelFormat::B8G8R8X8
                | PixelFormat::R8G8B8X8
                | PixelFormat::B8G8R8X8Srgb
                | PixelFormat::R8G8B8X8Srgb
        )
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            PixelFormat::B8G8R8X8Srgb
                | PixelFormat::R8G8B8X8Srgb
                | PixelFormat::B8G8R8A8Srgb
                | PixelFormat::R8G8B8A8Srgb
        )
    }

    /// Whether an aligned-word fast decode path exists for this format
    /// (4-byte-per-pixel formats only; the 2-byte formats always use the
    /// byte fallback, spec §4.4.2).
    pub fn has_fast_path(self) -> bool {
        self.bytes_per_pixel() == 4
    }
}

/// 256-entry sRGB electro-optical transfer function lookup table, mapping
/// an 8-bit sRGB-encoded channel value to its 8-bit linear equivalent.
pub static SRGB_TO_LINEAR: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let c = i as f64 / 255.0;
        let linear = if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
        *slot = (linear * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    table
});

fn srgb_decode(c: u8) -> u8 {
    SRGB_TO_LINEAR[c as usize]
}

/// Decode one pixel's worth of source bytes into canonical
/// `[R, G, B, A]` linear bytes. `bytes` must be exactly
/// `format.bytes_per_pixel()` long.
pub fn decode_pixel(format: PixelFormat, bytes: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::B8G8R8X8 => [bytes[2], bytes[1], bytes[0], 0xFF],
        PixelFormat::B8G8R8A8 => [bytes[2], bytes[1], bytes[0], bytes[3]],
        PixelFormat::R8G8B8X8 => [bytes[0], bytes[1], bytes[2], 0xFF],
        PixelFormat::R8G8B8A8 => [bytes[0], bytes[1], bytes[2], bytes[3]],
        PixelFormat::B8G8R8X8Srgb => {
            [srgb_decode(bytes[2]), srgb_decode(bytes[1]), srgb_decode(bytes[0]), 0xFF]
        }
        PixelFormat::R8G8B8X8Srgb => {
            [srgb_decode(bytes[0]), srgb_decode(bytes[1]), srgb_decode(bytes[2]), 0xFF]
        }
        PixelFormat::B8G8R8A8Srgb => {
            [srgb_decode(bytes[2]), srgb_decode(bytes[1]), srgb_decode(bytes[0]), bytes[3]]
        }
        PixelFormat::R8G8B8A8Srgb => {
            [srgb_decode(bytes[0]), srgb_decode(bytes[1]), srgb_decode(bytes[2]), bytes[3]]
        }
        PixelFormat::B5G6R5 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            let r5 = (v >> 11) & 0x1F;
            let g6 = (v >> 5) & 0x3F;
            let b5 = v & 0x1F;
            [expand5(r5), expand6(g6), expand5(b5), 0xFF]
        }
        PixelFormat::B5G5R5A1 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            let a1 = (v >> 15) & 0x1;
            let r5 = (v >> 10) & 0x1F;
            let g5 = (v >> 5) & 0x1F;
            let b5 = v & 0x1F;
            [expand5(r5), expand5(g5), expand5(b5), if a1 != 0 { 0xFF } else { 0x00 }]
        }
    }
}

fn expand5(v: u16) -> u8 {
    ((v << 3) | (v >> 2)) as u8
}

fn expand6(v: u16) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

/// Decode a full row of `width` pixels starting at `row`, dispatching to
/// the word-aligned fast path for 4-byte formats when the row is 4-byte
/// aligned, and the byte fallback otherwise (spec §4.4.2). Both paths
/// produce identical output; the distinction exists purely as a
/// performance seam for callers that want to specialize later.
pub fn decode_row(format: PixelFormat, row: &[u8], width: usize, row_base_aligned: bool) -> Vec<[u8; 4]> {
    let bpp = format.bytes_per_pixel();
    if format.has_fast_path() && row_base_aligned {
        decode_row_fast(format, row, width)
    } else {
        decode_row_slow(format, row, width, bpp)
    }
}

fn decode_row_fast(format: PixelFormat, row: &[u8], width: usize) -> Vec<[u8; 4]> {
    (0..width).map(|x| decode_pixel(format, &row[x * 4..x * 4 + 4])).collect()
}

fn decode_row_slow(format: PixelFormat, row: &[u8], width: usize, bpp: usize) -> Vec<[u8; 4]> {
    (0..width).map(|x| decode_pixel(format, &row[x * bpp..x * bpp + bpp])).collect()
}
