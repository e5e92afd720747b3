//! End-to-end screenshot scenarios through `ScreenshotService`, exercising
//! `vm-core`'s memory resolution together with `vm-gpu`'s scanout, cursor,
//! and compositing pipeline in one call (spec §8 Scenario 2, Scenario 7).

use vm_core::memory::GuestAddressSpace;
use vm_gpu::{
    format::PixelFormat,
    scanout::{ScanoutDescriptor, ScanoutFields, ScanoutSource},
    CursorDescriptor, CursorFields, ScreenshotRequest, ScreenshotService,
};

fn publish_bgrx_scanout(mem: &GuestAddressSpace, scanout: &ScanoutDescriptor, paddr: u64, width: u32, height: u32, pitch: u32, rows: &[&[u8]]) {
    for (y, row) in rows.iter().enumerate() {
        mem.ram.write(paddr as usize + y * pitch as usize, row).unwrap();
    }
    scanout.publish(ScanoutFields {
        source: ScanoutSource::ModernDriver,
        base_paddr: paddr,
        width,
        height,
        pitch_bytes: pitch,
        format: PixelFormat::B8G8R8X8,
    });
}

#[test]
fn opaque_cursor_overwrites_scanout_pixel_end_to_end() {
    let mem = GuestAddressSpace::new(0x4000);
    let scanout = ScanoutDescriptor::new();
    publish_bgrx_scanout(&mem, &scanout, 0x1000, 1, 1, 4, &[&[0x10, 0x20, 0x30, 0x00]]);

    let cursor = CursorDescriptor::new();
    mem.ram.write(0x2000, &[0x01, 0x02, 0x03, 0x00]).unwrap();
    cursor.publish(CursorFields {
        enable: true,
        x: 0,
        y: 0,
        hot_x: 0,
        hot_y: 0,
        width: 1,
        height: 1,
        pitch_bytes: 4,
        format: PixelFormat::B8G8R8X8,
        base_paddr: 0x2000,
    });

    let without_cursor = ScreenshotService::handle(
        ScreenshotRequest { request_id: 1, include_cursor: false },
        &mem,
        &scanout,
        &cursor,
        128,
        None,
    )
    .unwrap();
    assert_eq!(without_cursor.pixels, vec![0x30, 0x20, 0x10, 0xFF]);

    let with_cursor = ScreenshotService::handle(
        ScreenshotRequest { request_id: 2, include_cursor: true },
        &mem,
        &scanout,
        &cursor,
        128,
        None,
    )
    .unwrap();
    assert_eq!(with_cursor.pixels, vec![0x03, 0x02, 0x01, 0xFF]);
}

#[test]
fn cursor_clipped_at_negative_origin_end_to_end() {
    let mem = GuestAddressSpace::new(0x4000);
    let scanout = ScanoutDescriptor::new();
    publish_bgrx_scanout(
        &mem,
        &scanout,
        0x1000,
        2,
        1,
        8,
        &[&[0x10, 0x20, 0x30, 0x00, 0x01, 0x02, 0x03, 0x00]],
    );

    let cursor = CursorDescriptor::new();
    mem.ram.write(0x2000, &[0x0A, 0x0B, 0x0C, 0x00, 0x0D, 0x0E, 0x0F, 0x00]).unwrap();
    cursor.publish(CursorFields {
        enable: true,
        x: 0,
        y: 0,
        hot_x: 1,
        hot_y: 0,
        width: 2,
        height: 1,
        pitch_bytes: 8,
        format: PixelFormat::B8G8R8X8,
        base_paddr: 0x2000,
    });

    let resp = ScreenshotService::handle(
        ScreenshotRequest { request_id: 3, include_cursor: true },
        &mem,
        &scanout,
        &cursor,
        128,
        None,
    )
    .unwrap();
    assert_eq!(
        resp.pixels,
        vec![0x0F, 0x0E, 0x0D, 0xFF, 0x03, 0x02, 0x01, 0xFF]
    );
}

#[test]
fn disabled_cursor_is_skipped_entirely() {
    let mem = GuestAddressSpace::new(0x2000);
    let scanout = ScanoutDescriptor::new();
    publish_bgrx_scanout(&mem, &scanout, 0x1000, 1, 1, 4, &[&[0x10, 0x20, 0x30, 0x00]]);

    let cursor = CursorDescriptor::new();
    cursor.publish(CursorFields {
        enable: false,
        x: 0,
        y: 0,
        hot_x: 0,
        hot_y: 0,
        width: 1,
        height: 1,
        pitch_bytes: 4,
        format: PixelFormat::B8G8R8X8,
        base_paddr: 0,
    });

    let resp = ScreenshotService::handle(
        ScreenshotRequest { request_id: 4, include_cursor: true },
        &mem,
        &scanout,
        &cursor,
        128,
        None,
    )
    .unwrap();
    assert_eq!(resp.pixels, vec![0x30, 0x20, 0x10, 0xFF]);
}
