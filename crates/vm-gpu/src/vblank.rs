//! Vblank synthesis: a monotonic counter plus last-vblank timestamp,
//! readable via the debug escape channel (spec §4.4.5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct VblankClock {
    seq: AtomicU64,
    last_time_ns: AtomicU64,
    period: Duration,
}

impl VblankClock {
    /// `refresh_hz` is the presenter's refresh-rate estimate; the vblank
    /// period is derived from it (spec §4.4.5).
    pub fn new(refresh_hz: f64) -> Self {
        let period_ns = if refresh_hz > 0.0 { (1_000_000_000.0 / refresh_hz) as u64 } else { 16_666_667 };
        Self {
            seq: AtomicU64::new(0),
            last_time_ns: AtomicU64::new(0),
            period: Duration::from_nanos(period_ns),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Record a vblank event at `now_ns` (caller supplies the timestamp so
    /// this stays deterministic and testable).
    pub fn tick(&self, now_ns: u64) -> u64 {
        self.last_time_ns.store(now_ns, Ordering::Release);
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    pub fn last_time_ns(&self) -> u64 {
        self.last_time_ns.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_seq_and_records_time() {
        let clock = VblankClock::new(60.0);
        assert_eq!(clock.tick(1_000), 1);
        assert_eq!(clock.tick(2_000), 2);
        assert_eq!(clock.last_time_ns(), 2_000);
    }

    #[test]
    fn period_derived_from_refresh_rate() {
        let clock = VblankClock::new(60.0);
        assert!((clock.period().as_micros() as i64 - 16_667).abs() < 5);
    }
}
