//! Scenario 6 — single-step produces exactly one `Paused{SingleStep}` and
//! advances `rip` by one (spec §8 Scenario 6).

use std::time::Duration;
use vm_core::memory::GuestAddressSpace;
use vm_cpu::{Command, CpuWorker, Event, PauseReason, StepOutcome};

struct OneTickStepper {
    rip: u64,
}

impl vm_cpu::CpuStepper for OneTickStepper {
    fn step(&mut self) -> StepOutcome {
        self.rip += 1;
        StepOutcome { rip: self.rip, serial_byte: None, trace_record: None }
    }
}

#[test]
fn single_step_advances_rip_by_one_and_pauses_once() {
    let mem = GuestAddressSpace::new(0x100);
    let mut worker = CpuWorker::new(OneTickStepper { rip: 41 }, 16);
    worker.finish_init();

    let events = worker.tick(Duration::ZERO, vec![Command::Step], &mem);

    let paused: Vec<_> = events.iter().filter(|e| matches!(e, Event::Paused { .. })).collect();
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0], &Event::Paused { reason: PauseReason::SingleStep });

    let state_events = worker.tick(Duration::ZERO, vec![Command::RequestCpuState], &mem);
    let Event::CpuState(snapshot) = &state_events[0] else { panic!("expected CpuState event") };
    assert_eq!(snapshot.rip, 42);
}
