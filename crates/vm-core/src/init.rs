//! Worker readiness handshake and role tagging.
//!
//! spec §2 says the coordinator "publishes an init bundle to each worker
//! containing handles to the shared regions and a role tag" and that
//! "workers signal readiness on a status word" without specifying its
//! shape; this is that shape (SPEC_FULL §11).

use std::sync::atomic::{AtomicU32, Ordering};

/// Which role a worker plays, carried in its init bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Cpu,
    Io,
    Gpu,
    Disk,
    Net,
}

impl WorkerRole {
    pub fn thread_name(&self) -> &'static str {
        match self {
            WorkerRole::Cpu => "cpu-worker",
            WorkerRole::Io => "io-worker",
            WorkerRole::Gpu => "gpu-worker",
            WorkerRole::Disk => "disk-worker",
            WorkerRole::Net => "net-worker",
        }
    }
}

const NOT_READY: u32 = 0;
const READY: u32 = 1;
const FAILED: u32 = 2;

/// Single-word readiness handshake a worker flips after mapping its
/// shared-memory handles and before entering its steady-state loop.
#[derive(Default)]
pub struct ReadyWord(AtomicU32);

/// Observed state of a [`ReadyWord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
    Failed,
}

impl ReadyWord {
    pub fn new() -> Self {
        Self(AtomicU32::new(NOT_READY))
    }

    pub fn mark_ready(&self) {
        self.0.store(READY, Ordering::Release);
    }

    pub fn mark_failed(&self) {
        self.0.store(FAILED, Ordering::Release);
    }

    pub fn get(&self) -> Readiness {
        match self.0.load(Ordering::Acquire) {
            READY => Readiness::Ready,
            FAILED => Readiness::Failed,
            _ => Readiness::NotReady,
        }
    }
}
