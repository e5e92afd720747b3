//! Debug CPU worker tick loop: an execution batch per cooperative tick,
//! then yield to the message pump and flush traces (spec §4.5 "Execution
//! batch").

use crate::state::{Command, CpuController, CpuRunState, Event};
use crate::trace::TraceBuffer;
use std::time::Duration;
use vm_core::memory::GuestAddressSpace;

/// Instructions executed per tick before yielding control back to the
/// message pump, balancing throughput against command responsiveness
/// (spec §4.5).
const BATCH_SIZE: usize = 5000;

/// The result of executing exactly one instruction. Concrete instruction
/// semantics are out of scope; implementors drive whatever execution
/// engine backs the guest and report back through this contract.
pub struct StepOutcome {
    pub rip: u64,
    pub serial_byte: Option<u8>,
    pub trace_record: Option<Vec<u8>>,
}

pub trait CpuStepper: Send {
    fn step(&mut self) -> StepOutcome;
}

pub struct CpuWorker<S: CpuStepper> {
    controller: CpuController,
    stepper: S,
    trace: TraceBuffer,
}

impl<S: CpuStepper> CpuWorker<S> {
    pub fn new(stepper: S, trace_capacity: usize) -> Self {
        Self { controller: CpuController::new(), stepper, trace: TraceBuffer::new(trace_capacity) }
    }

    pub fn finish_init(&mut self) {
        self.controller.finish_init();
    }

    pub fn run_state(&self) -> CpuRunState {
        self.controller.run_state()
    }

    pub fn trace_dropped(&self) -> u64 {
        self.trace.dropped()
    }

    fn apply_command(&mut self, cmd: Command, mem: &GuestAddressSpace) -> Vec<Event> {
        match cmd {
            Command::ReadMemory { paddr, len } => match mem.read_span(paddr, len) {
                Ok(bytes) => vec![Event::MemoryData { paddr, bytes }],
                Err(_) => vec![Event::MemoryData { paddr, bytes: Vec::new() }],
            },
            Command::RequestDeviceState => {
                vec![Event::DeviceState { description: format!("rip={:#x}", self.controller.rip()) }]
            }
            Command::EnableTrace { filter, sample_rate, include_instructions, include_port_io } => {
                self.trace.enable(filter, sample_rate, include_instructions, include_port_io);
                Vec::new()
            }
            Command::DisableTrace => {
                self.trace.disable();
                Vec::new()
            }
            other => self.controller.apply_command(other),
        }
    }

    /// Process pending commands, then (if Running) execute up to
    /// [`BATCH_SIZE`] instructions, then flush the trace buffer if due.
    pub fn tick(&mut self, now: Duration, commands: Vec<Command>, mem: &GuestAddressSpace) -> Vec<Event> {
        let mut events = Vec::new();
        for cmd in commands {
            events.extend(self.apply_command(cmd, mem));
        }

        if self.controller.run_state() == CpuRunState::Running {
            let mut serial = Vec::new();
            for _ in 0..BATCH_SIZE {
                if self.controller.run_state() != CpuRunState::Running {
                    break;
                }
                let outcome = self.stepper.step();
                if let Some(byte) = outcome.serial_byte {
                    serial.push(byte);
                }
                if let Some(record) = outcome.trace_record {
                    self.trace.record_instruction(record);
                }
                let step_events = self.controller.record_step(outcome.rip);
                let paused_now = !step_events.is_empty();
                events.extend(step_events);
                if paused_now {
                    break;
                }
            }
            if !serial.is_empty() {
                events.push(Event::SerialOutput { bytes: serial });
            }
        }

        let pausing = self.controller.run_state() == CpuRunState::Paused;
        if self.trace.should_flush(now, pausing) {
            events.push(Event::TraceChunk { records: self.trace.flush(now) });
        }
        events
    }
}
