//! GPU worker tick loop: submission retirement, vblank synthesis, and the
//! present() outcome contract (spec §4.4.1, §4.4.5, §4.4.6).
//!
//! Actual surface presentation (swapchain acquire, compositor handoff) is
//! host-windowing-system territory and out of scope; callers report the
//! outcome of that step to [`GpuWorker::present`] and this module handles
//! the bookkeeping spec §4.4.6 requires.

use crate::framebuffer::{FrameState, FramebufferHeader};
use crate::mmio::{GpuMmio, INT_FENCE, INT_SCANOUT_VBLANK};
use crate::submission::PendingSubmissions;
use crate::vblank::VblankClock;

/// The three-valued `present()` outcome (spec §4.4.6, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Frame was presented; `frame_seq` advances.
    Presented,
    /// Intentionally dropped (surface-acquire timeout, recoverable GPU
    /// error). `frame_seq` does not advance.
    Dropped,
    /// Back-compat path with no acquire/drop signal at all; treated as
    /// presented.
    Absent,
}

/// Ties together the per-tick GPU worker responsibilities: retiring
/// completed submissions, synthesizing vblank, and gating presentation
/// through [`FrameState`] / [`FramebufferHeader`].
pub struct GpuWorker {
    pub mmio: GpuMmio,
    pub vblank: VblankClock,
    pending: std::sync::Mutex<PendingSubmissions>,
}

impl GpuWorker {
    pub fn new(refresh_hz: f64) -> Self {
        Self {
            mmio: GpuMmio::new(),
            vblank: VblankClock::new(refresh_hz),
            pending: std::sync::Mutex::new(PendingSubmissions::new()),
        }
    }

    /// Record a newly-accepted submission (spec §4.4.1).
    pub fn track_submission(&self, fence: u32, dma_buffer_gpa: u64, desc_gpa: u64, max_pending: usize) -> vm_core::error::VmResult<()> {
        self.pending.lock().expect("pending submissions mutex poisoned").push(fence, dma_buffer_gpa, desc_gpa, max_pending)
    }

    /// Simulate completion up through `fence_completed`: publish the
    /// register, retire the matching pending entries, and raise the fence
    /// interrupt if anything retired (spec §4.4.1).
    pub fn retire_submissions(&self, fence_completed: u32) -> Vec<(u64, u64)> {
        self.mmio.write(crate::mmio::FENCE_COMPLETED, fence_completed);
        let retired = self.pending.lock().expect("pending submissions mutex poisoned").retire(fence_completed);
        if !retired.is_empty() {
            self.mmio.raise_interrupt(INT_FENCE);
        }
        retired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending submissions mutex poisoned").pending_count()
    }

    /// Advance the vblank clock and raise the vblank interrupt edge
    /// (spec §4.4.5).
    pub fn tick_vblank(&self, now_ns: u64) -> u64 {
        let seq = self.vblank.tick(now_ns);
        self.mmio.raise_interrupt(INT_SCANOUT_VBLANK);
        seq
    }

    /// Apply a present() outcome to the shared framebuffer's flip state
    /// (spec §4.4.6): only `Presented`/`Absent` advance `frame_seq`, and
    /// `Dropped` leaves the active buffer and frame state untouched.
    pub fn present(&self, outcome: PresentOutcome, framebuffer: &FramebufferHeader, frame_state: &FrameState) {
        match outcome {
            PresentOutcome::Presented | PresentOutcome::Absent => {
                frame_state.begin_presenting();
                framebuffer.flip();
                frame_state.finish_presented();
            }
            PresentOutcome::Dropped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_present_does_not_advance_frame_seq() {
        let worker = GpuWorker::new(60.0);
        let fb = FramebufferHeader::new(4, 4, 16, 0, 8);
        let state = FrameState::default();
        worker.present(PresentOutcome::Dropped, &fb, &state);
        assert_eq!(fb.frame_seq(), 0);
        assert_eq!(state.status(), crate::framebuffer::FrameStatus::Dirty);
    }

    #[test]
    fn presented_and_absent_both_advance_and_flip() {
        let worker = GpuWorker::new(60.0);
        let fb = FramebufferHeader::new(4, 4, 16, 0, 8);
        let state = FrameState::default();
        worker.present(PresentOutcome::Presented, &fb, &state);
        assert_eq!(fb.frame_seq(), 1);
        assert_eq!(state.status(), crate::framebuffer::FrameStatus::Presented);
        worker.present(PresentOutcome::Absent, &fb, &state);
        assert_eq!(fb.frame_seq(), 2);
    }

    #[test]
    fn retirement_raises_fence_interrupt_only_when_something_retires() {
        let worker = GpuWorker::new(60.0);
        worker.track_submission(1, 0x1000, 0x2000, 16).unwrap();
        assert_eq!(worker.mmio.interrupt_status() & INT_FENCE, 0);
        let retired = worker.retire_submissions(1);
        assert_eq!(retired.len(), 1);
        assert_eq!(worker.mmio.interrupt_status() & INT_FENCE, INT_FENCE);
        assert_eq!(worker.pending_count(), 0);
    }

    #[test]
    fn vblank_tick_raises_interrupt_and_advances_clock() {
        let worker = GpuWorker::new(60.0);
        let seq = worker.tick_vblank(5_000);
        assert_eq!(seq, 1);
        assert_eq!(worker.mmio.interrupt_status() & INT_SCANOUT_VBLANK, INT_SCANOUT_VBLANK);
    }
}
