//! Scanout/cursor decode and composition, the submission ring, screenshot
//! readback, and the GPU worker tick loop (spec §4.4).

pub mod compose;
pub mod cursor;
pub mod format;
pub mod framebuffer;
pub mod mmio;
pub mod scanout;
pub mod screenshot;
pub mod submission;
pub mod vblank;
pub mod worker;

pub use cursor::{CursorDescriptor, CursorFields, CursorSnapshot};
pub use format::PixelFormat;
pub use scanout::{ScanoutDescriptor, ScanoutFields, ScanoutSnapshot, ScanoutSource};
pub use screenshot::{ScreenshotRequest, ScreenshotResponse, ScreenshotService};
pub use worker::{GpuWorker, PresentOutcome};
