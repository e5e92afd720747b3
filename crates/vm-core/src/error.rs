//! Error taxonomy shared by every worker.
//!
//! Mirrors the error kinds a production emulator actually needs to
//! distinguish: back-pressure is never fatal, protocol violations drop the
//! offending record and keep the worker alive, writer-stuck degrades to a
//! stub response, and only a handful of conditions are genuinely fatal.

use thiserror::Error;

/// Structured error kind for the VM's shared-memory data plane.
///
/// Library crates (`vm-core`, `vm-gpu`, `vm-cpu`, `vm-io`, `vm-hid`) return
/// this type from fallible operations. `vmctl` converts it to
/// `anyhow::Error` at the boundary where it only needs to log or surface
/// the error, never match on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Ring full on push, or a surface-acquire timeout. Caller should drop
    /// the record, bump a counter, and retry on the next tick.
    #[error("back-pressure: {0}")]
    BackPressure(String),

    /// Unknown opcode, mismatched correlation id, malformed descriptor, or
    /// a seqlock generation busy-bit misuse. The offending record is
    /// dropped; the worker keeps running.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A seqlock reader exceeded its retry bound. Callers substitute a
    /// deterministic stub rather than propagating this further.
    #[error("writer stuck: retry bound exceeded after {retries} attempts")]
    WriterStuck {
        /// Number of retries attempted before giving up.
        retries: u32,
    },

    /// Allocation failure for pending-submission bookkeeping or similar.
    /// The caller must not leak any allocation already made.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A host peer (HID device, worker port) disappeared. The owner
    /// unbridges cleanly and keeps serving other peers.
    #[error("peer disappeared: {0}")]
    PeerDisappeared(String),

    /// Magic/version mismatch, or an unrecoverable context loss. The
    /// affected worker stops; the coordinator surfaces the error.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl VmError {
    /// True for errors the caller should recover from without tearing
    /// anything down (§7: transient back-pressure, protocol violation,
    /// writer-stuck, peer disappearance all recover in place).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, VmError::Fatal(_))
    }
}

/// Convenience alias used throughout the data-plane crates.
pub type VmResult<T> = Result<T, VmError>;
