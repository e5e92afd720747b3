//! CPU <-> I/O worker transport built on [`vm_core::ring::RingBuffer`]
//! (spec §4.3).

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{IoClient, PendingCalls};
pub use protocol::{Request, RequestKind, Response, ResponseKind};
pub use server::{DeviceModel, IoServer};
