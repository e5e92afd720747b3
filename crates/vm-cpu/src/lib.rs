//! Debug CPU: state machine, trace buffer, and worker tick loop (spec §4.5).

pub mod state;
pub mod trace;
pub mod worker;

pub use state::{Command, CpuController, CpuRunState, CpuSnapshot, Event, PauseReason};
pub use worker::{CpuStepper, CpuWorker, StepOutcome};
