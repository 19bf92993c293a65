//! DETOUR Deterministic Simulation
//!
//! Simulated tracees whose stops come from a script and whose injected
//! syscalls run against a scripted kernel. Scenario files describe a set of
//! such tracees and the diversion steps to drive them through.
//! Random scripts are reproducible from a seed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generate;
pub mod kernel;
pub mod record;
pub mod scenario;
pub mod seed;
pub mod stop;
pub mod task;

pub use generate::ScriptGenerator;
pub use kernel::{KernelResult, SimKernel};
pub use record::{RunComparison, SharedRecord, SimEvent, SimRecord};
pub use scenario::{Scenario, ScenarioError, StepCommand, StepSpec, TaskSpec};
pub use seed::{SeedSource, SimSeed};
pub use stop::{SimStop, SyscallRef};
pub use task::{InjectedSyscall, SimSite, SimTask, PRELOAD_GLOBALS_SIZE};
