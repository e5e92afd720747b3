//! Screenshot readback: scanout snapshot -> address resolution -> format
//! decode -> optional cursor composite -> canonical RGBA8 (spec §4.4.2,
//! §4.4.3, §4.4.4).

use crate::compose::{composite_cursor, Canvas};
use crate::cursor::CursorDescriptor;
use crate::format::decode_row;
use crate::scanout::{ScanoutDescriptor, ScanoutSnapshot, ScanoutSource};
use vm_core::error::VmResult;
use vm_core::memory::GuestAddressSpace;

/// `{request_id, include_cursor}` (spec §4.4.4).
#[derive(Debug, Clone, Copy)]
pub struct ScreenshotRequest {
    pub request_id: u64,
    pub include_cursor: bool,
}

/// `{request_id, width, height, pixels: R8G8B8A8}`.
#[derive(Debug, Clone)]
pub struct ScreenshotResponse {
    pub request_id: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// The 1x1 black stub returned when a seqlock snapshot is `WriterStuck`
/// (spec §4.4.4, §7, §8 Scenario 5).
fn stub_canvas() -> Canvas {
    let mut canvas = Canvas::new(1, 1);
    canvas.pixels[0] = [0x00, 0x00, 0x00, 0xFF];
    canvas
}

/// Decode the active scanout surface into a canvas. `legacy_framebuffer`
/// supplies the already-RGBA8 shared framebuffer for the
/// `LegacyVbeLfb` + `base_paddr == 0` case (spec §4.4.2).
pub fn capture_scanout(
    mem: &GuestAddressSpace,
    scanout: &ScanoutDescriptor,
    retry_bound: u32,
    legacy_framebuffer: Option<(&[u8], u32, u32)>,
) -> VmResult<Canvas> {
    match scanout.snapshot(retry_bound) {
        ScanoutSnapshot::WriterStuck { .. } => Ok(stub_canvas()),
        ScanoutSnapshot::InvalidFormat => Ok(stub_canvas()),
        ScanoutSnapshot::Valid(fields) => {
            if fields.source == ScanoutSource::LegacyVbeLfb && fields.base_paddr == 0 {
                if let Some((bytes, width, height)) = legacy_framebuffer {
                    let mut canvas = Canvas::new(width as usize, height as usize);
                    canvas.pixels.copy_from_slice(
                        &bytes
                            .chunks_exact(4)
                            .map(|c| [c[0], c[1], c[2], c[3]])
                            .collect::<Vec<_>>(),
                    );
                    return Ok(canvas);
                }
            }

            let span = mem.read_span(fields.base_paddr, fields.required_span())?;
            let mut canvas = Canvas::new(fields.width as usize, fields.height as usize);
            let bpp = fields.format.bytes_per_pixel();
            let row_aligned = fields.base_paddr % 4 == 0 && fields.pitch_bytes % 4 == 0;
            for y in 0..fields.height as usize {
                let row_start = y * fields.pitch_bytes as usize;
                let row_end = row_start + fields.width as usize * bpp;
                let row = &span[row_start..row_end];
                let decoded = decode_row(fields.format, row, fields.width as usize, row_aligned);
                canvas.pixels[y * fields.width as usize..(y + 1) * fields.width as usize]
                    .copy_from_slice(&decoded);
            }
            Ok(canvas)
        }
    }
}

/// Composite the cursor (if enabled and not writer-stuck) onto an
/// already-captured scanout canvas.
pub fn composite_cursor_onto(
    canvas: &mut Canvas,
    mem: &GuestAddressSpace,
    cursor: &CursorDescriptor,
    retry_bound: u32,
) -> VmResult<()> {
    let snapshot = cursor.snapshot(retry_bound);
    let Some(fields) = snapshot.enabled_fields() else {
        return Ok(());
    };
    let required = fields.pitch_bytes as usize * fields.height.saturating_sub(1) as usize
        + fields.width as usize * fields.format.bytes_per_pixel();
    let raw = match mem.read_span(fields.base_paddr, required) {
        Ok(bytes) => bytes,
        // A malformed cursor surface degrades to "no cursor" rather than
        // failing the whole screenshot (spec §7 protocol-violation policy).
        Err(_) => return Ok(()),
    };
    composite_cursor(
        canvas,
        fields.format,
        &raw,
        fields.pitch_bytes as usize,
        fields.width as usize,
        fields.height as usize,
        fields.origin(),
    );
    Ok(())
}

/// Request/response screenshot service (spec §4.4.4).
pub struct ScreenshotService;

impl ScreenshotService {
    pub fn handle(
        req: ScreenshotRequest,
        mem: &GuestAddressSpace,
        scanout: &ScanoutDescriptor,
        cursor: &CursorDescriptor,
        retry_bound: u32,
        legacy_framebuffer: Option<(&[u8], u32, u32)>,
    ) -> VmResult<ScreenshotResponse> {
        let mut canvas = capture_scanout(mem, scanout, retry_bound, legacy_framebuffer)?;
        if req.include_cursor {
            composite_cursor_onto(&mut canvas, mem, cursor, retry_bound)?;
        }
        Ok(ScreenshotResponse {
            request_id: req.request_id,
            width: canvas.width as u32,
            height: canvas.height as u32,
            pixels: canvas.to_bytes(),
        })
    }
}
