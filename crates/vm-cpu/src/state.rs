//! Debug CPU state machine: commands in, events out (spec §4.5).

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuRunState {
    Running,
    Paused,
}

/// Why the CPU transitioned to `Paused`, carried on the `Paused` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Initial state before the worker's init handshake completes.
    Init,
    /// An explicit `Pause` command.
    Explicit,
    /// `step_budget` reached zero.
    SingleStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Step,
    SetBreakpoint { rip: u64 },
    RemoveBreakpoint { rip: u64 },
    ClearBreakpoints,
    ReadMemory { paddr: u64, len: usize },
    RequestCpuState,
    RequestDeviceState,
    EnableTrace { filter: String, sample_rate: u32, include_instructions: bool, include_port_io: bool },
    DisableTrace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub rip: u64,
    pub run_state: CpuRunState,
    pub step_budget: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Paused { reason: PauseReason },
    BreakpointHit { rip: u64 },
    CpuState(CpuSnapshot),
    DeviceState { description: String },
    MemoryData { paddr: u64, bytes: Vec<u8> },
    TraceChunk { records: Vec<Vec<u8>> },
    SerialOutput { bytes: Vec<u8> },
}

/// Holds the state machine's mutable state: run state, step budget,
/// breakpoint set, and the simulated instruction pointer. Stepping the
/// actual guest is the caller's job via [`crate::worker::CpuStepper`]; this
/// type only tracks the control-flow contract spec §4.5 describes.
pub struct CpuController {
    run_state: CpuRunState,
    step_budget: u64,
    breakpoints: HashSet<u64>,
    rip: u64,
    /// True once a `Step` command has armed the step budget and until it
    /// is consumed; distinguishes "stepping toward a budget of zero" from
    /// "never asked to step, run free" (both have `step_budget == 0`).
    step_was_active: bool,
}

impl Default for CpuController {
    fn default() -> Self {
        Self {
            run_state: CpuRunState::Paused,
            step_budget: 0,
            breakpoints: HashSet::new(),
            rip: 0,
            step_was_active: false,
        }
    }
}

impl CpuController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_state(&self) -> CpuRunState {
        self.run_state
    }

    pub fn rip(&self) -> u64 {
        self.rip
    }

    pub fn step_budget(&self) -> u64 {
        self.step_budget
    }

    /// Init handshake complete: Paused -> Running (spec §4.5 "Initial
    /// state: Paused until init completes; then Running").
    pub fn finish_init(&mut self) {
        self.run_state = CpuRunState::Running;
    }

    pub fn apply_command(&mut self, cmd: Command) -> Vec<Event> {
        match cmd {
            Command::Pause => {
                if self.run_state == CpuRunState::Running {
                    self.run_state = CpuRunState::Paused;
                    vec![Event::Paused { reason: PauseReason::Explicit }]
                } else {
                    Vec::new()
                }
            }
            Command::Resume => {
                self.run_state = CpuRunState::Running;
                Vec::new()
            }
            Command::Step => {
                self.step_budget += 1;
                self.step_was_active = true;
                self.run_state = CpuRunState::Running;
                Vec::new()
            }
            Command::SetBreakpoint { rip } => {
                self.breakpoints.insert(rip);
                Vec::new()
            }
            Command::RemoveBreakpoint { rip } => {
                self.breakpoints.remove(&rip);
                Vec::new()
            }
            Command::ClearBreakpoints => {
                self.breakpoints.clear();
                Vec::new()
            }
            Command::RequestCpuState => vec![Event::CpuState(self.snapshot())],
            // `ReadMemory`, `RequestDeviceState`, `EnableTrace`, `DisableTrace`
            // need data this controller doesn't own; the worker handles them.
            Command::ReadMemory { .. }
            | Command::RequestDeviceState
            | Command::EnableTrace { .. }
            | Command::DisableTrace => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot { rip: self.rip, run_state: self.run_state, step_budget: self.step_budget }
    }

    pub fn has_breakpoint(&self, rip: u64) -> bool {
        self.breakpoints.contains(&rip)
    }

    /// Record the result of executing one instruction. Returns the events
    /// produced: a breakpoint hit pauses immediately; otherwise an
    /// exhausted step budget pauses with `SingleStep`.
    pub fn record_step(&mut self, new_rip: u64) -> Vec<Event> {
        self.rip = new_rip;
        if self.step_budget > 0 {
            self.step_budget -= 1;
        }
        if self.breakpoints.contains(&new_rip) {
            self.run_state = CpuRunState::Paused;
            return vec![
                Event::BreakpointHit { rip: new_rip },
                Event::Paused { reason: PauseReason::Explicit },
            ];
        }
        if self.step_budget == 0 && self.run_state == CpuRunState::Running && self.step_was_active {
            self.run_state = CpuRunState::Paused;
            self.step_was_active = false;
            return vec![Event::Paused { reason: PauseReason::SingleStep }];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_paused_then_init_completes_to_running() {
        let ctl = CpuController::new();
        assert_eq!(ctl.run_state(), CpuRunState::Paused);
    }

    #[test]
    fn pause_resume_round_trip() {
        let mut ctl = CpuController::new();
        ctl.finish_init();
        assert_eq!(ctl.run_state(), CpuRunState::Running);
        let events = ctl.apply_command(Command::Pause);
        assert_eq!(events, vec![Event::Paused { reason: PauseReason::Explicit }]);
        ctl.apply_command(Command::Resume);
        assert_eq!(ctl.run_state(), CpuRunState::Running);
    }

    #[test]
    fn breakpoint_hit_pauses_and_emits_event() {
        let mut ctl = CpuController::new();
        ctl.finish_init();
        ctl.apply_command(Command::SetBreakpoint { rip: 0x4000 });
        let events = ctl.record_step(0x4000);
        assert_eq!(
            events,
            vec![Event::BreakpointHit { rip: 0x4000 }, Event::Paused { reason: PauseReason::Explicit }]
        );
        assert_eq!(ctl.run_state(), CpuRunState::Paused);
    }

    #[test]
    fn free_run_without_step_budget_never_pauses() {
        let mut ctl = CpuController::new();
        ctl.finish_init();
        for rip in 0..100u64 {
            assert!(ctl.record_step(rip).is_empty());
        }
        assert_eq!(ctl.run_state(), CpuRunState::Running);
    }

    #[test]
    fn step_budget_exhaustion_pauses_with_single_step_reason() {
        let mut ctl = CpuController::new();
        ctl.finish_init();
        ctl.apply_command(Command::Step);
        ctl.apply_command(Command::Step);
        assert!(ctl.record_step(1).is_empty());
        let events = ctl.record_step(2);
        assert_eq!(events, vec![Event::Paused { reason: PauseReason::SingleStep }]);
        assert_eq!(ctl.run_state(), CpuRunState::Paused);
    }

    #[test]
    fn removed_breakpoint_no_longer_trips() {
        let mut ctl = CpuController::new();
        ctl.finish_init();
        ctl.apply_command(Command::SetBreakpoint { rip: 0x4000 });
        ctl.apply_command(Command::RemoveBreakpoint { rip: 0x4000 });
        assert!(ctl.record_step(0x4000).is_empty());
    }
}
