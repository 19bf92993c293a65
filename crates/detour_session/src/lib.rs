//! DETOUR Diversion Sessions
//!
//! A diversion lets tasks from a replay run live for a while, off the
//! recording. Each step resumes one task under `PTRACE_SYSEMU` so that every
//! syscall it makes stops at entry and goes through the syscall policy.
//! Signal stops are handed to a trap diagnoser for the debugger.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address_space;
pub mod config;
pub mod diagnose;
pub mod diagnostics;
pub mod emufs;
pub mod error;
pub mod result;
pub mod session;
mod step;

pub use address_space::AddressSpace;
pub use config::DiversionConfig;
pub use diagnose::{BreakpointDiagnoser, TrapDiagnoser};
pub use diagnostics::{AbortOnViolation, CapturingDiagnostics, Diagnostics};
pub use emufs::{EmuFile, EmuFs, FileKey};
pub use error::{ContractViolation, DiversionError, SessionResult};
pub use result::{BreakStatus, DiversionResult, DiversionStatus, RunCommand};
pub use session::DiversionSession;
