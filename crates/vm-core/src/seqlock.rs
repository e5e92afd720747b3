//! Seqlock-protected fixed-width descriptor.
//!
//! Used for `ScanoutState`, `CursorState`, and any other small mailbox that
//! a single writer publishes and many readers snapshot wait-free. See
//! spec §4.2.

use std::sync::atomic::{AtomicU32, Ordering};

/// Bit 31 of the generation word marks the descriptor as mid-publish.
pub const BUSY_BIT: u32 = 1 << 31;

/// Default bound on snapshot retries before a reader gives up and treats
/// the writer as stuck (spec §4.2 suggests "e.g. 128").
pub const DEFAULT_RETRY_BOUND: u32 = 128;

/// Outcome of a single snapshot attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotResult<const N: usize> {
    /// A torn-free read: the field tuple matches some atomic publish.
    Valid([u32; N]),
    /// The generation changed between the two reads (or the busy bit was
    /// observed) — the caller should retry.
    StaleRetry,
    /// The retry bound was exceeded; the writer is presumed wedged.
    WriterStuck {
        /// Number of retries attempted.
        retries: u32,
    },
}

impl<const N: usize> SnapshotResult<N> {
    pub fn is_valid(&self) -> bool {
        matches!(self, SnapshotResult::Valid(_))
    }
}

/// A seqlock-protected array of `N` 32-bit words, plus its own generation
/// counter. Single writer, many wait-free readers.
pub struct Seqlock<const N: usize> {
    generation: AtomicU32,
    fields: [AtomicU32; N],
}

impl<const N: usize> Default for Seqlock<N> {
    fn default() -> Self {
        Self::new([0; N])
    }
}

impl<const N: usize> Seqlock<N> {
    pub fn new(initial: [u32; N]) -> Self {
        Self {
            generation: AtomicU32::new(0),
            fields: initial.map(AtomicU32::new),
        }
    }

    /// Publish a new field tuple. Fails if another writer is already
    /// mid-publish (single-writer invariant violated) — this should never
    /// happen in correct usage and indicates a bug in the caller.
    pub fn publish(&self, fields: [u32; N]) {
        let gen = self.generation.load(Ordering::Relaxed);
        debug_assert_eq!(gen & BUSY_BIT, 0, "seqlock: publish while already busy");
        self.generation.store(gen | BUSY_BIT, Ordering::Release);
        for (slot, value) in self.fields.iter().zip(fields) {
            slot.store(value, Ordering::Relaxed);
        }
        // Busy bit cleared, parity advanced by 2 (skips the odd "busy"
        // value so completed generations are always even).
        self.generation.store(gen.wrapping_add(2), Ordering::Release);
    }

    fn snapshot_once(&self) -> SnapshotResult<N> {
        let g1 = self.generation.load(Ordering::Acquire);
        if g1 & BUSY_BIT != 0 {
            std::hint::spin_loop();
            return SnapshotResult::StaleRetry;
        }
        let mut out = [0u32; N];
        for (slot, value) in self.fields.iter().zip(out.iter_mut()) {
            *value = slot.load(Ordering::Relaxed);
        }
        let g2 = self.generation.load(Ordering::Acquire);
        if g1 == g2 {
            SnapshotResult::Valid(out)
        } else {
            SnapshotResult::StaleRetry
        }
    }

    /// Snapshot the descriptor, retrying up to `retry_bound` times.
    pub fn snapshot(&self, retry_bound: u32) -> SnapshotResult<N> {
        for attempt in 0..retry_bound {
            match self.snapshot_once() {
                SnapshotResult::Valid(fields) => return SnapshotResult::Valid(fields),
                SnapshotResult::StaleRetry => {
                    if attempt + 1 == retry_bound {
                        break;
                    }
                    std::thread::yield_now();
                }
                other => return other,
            }
        }
        SnapshotResult::WriterStuck { retries: retry_bound }
    }

    /// Snapshot using [`DEFAULT_RETRY_BOUND`].
    pub fn snapshot_default(&self) -> SnapshotResult<N> {
        self.snapshot(DEFAULT_RETRY_BOUND)
    }

    /// Current raw generation word, for diagnostics/tests only.
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Force the generation word to a caller-chosen raw value. Test-only:
    /// used to simulate a wedged writer (spec §8 Scenario 5).
    #[doc(hidden)]
    pub fn force_generation_for_test(&self, value: u32) {
        self.generation.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_snapshot_uncontended() {
        let lock: Seqlock<4> = Seqlock::default();
        lock.publish([1, 2, 3, 4]);
        assert_eq!(lock.snapshot_default(), SnapshotResult::Valid([1, 2, 3, 4]));
    }

    #[test]
    fn stuck_writer_yields_writer_stuck_within_bound() {
        let lock: Seqlock<2> = Seqlock::default();
        lock.force_generation_for_test(BUSY_BIT | 1);
        match lock.snapshot(16) {
            SnapshotResult::WriterStuck { retries } => assert_eq!(retries, 16),
            other => panic!("expected WriterStuck, got {other:?}"),
        }
    }

    #[test]
    fn sequential_publishes_are_independently_observable() {
        let lock: Seqlock<1> = Seqlock::default();
        for i in 0..50u32 {
            lock.publish([i]);
            assert_eq!(lock.snapshot_default(), SnapshotResult::Valid([i]));
        }
    }

    #[test]
    fn concurrent_publish_and_snapshot_never_tears() {
        use std::sync::Arc;
        let lock = Arc::new(Seqlock::<4>::default());
        let writer = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                for i in 0..2000u32 {
                    lock.publish([i, i, i, i]);
                }
            })
        };
        let reader = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    if let SnapshotResult::Valid(fields) = lock.snapshot_default() {
                        assert!(fields.iter().all(|&f| f == fields[0]), "torn read: {fields:?}");
                    }
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }
}
