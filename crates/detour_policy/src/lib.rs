//! DETOUR Syscall Policy
//!
//! Decides what happens to each syscall a diverted task makes: the
//! desched ioctl is a no-op, signal-sending syscalls that could reach live
//! processes are suppressed, and everything else is reissued against the
//! live kernel by remote injection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod engine;
pub mod remote;

pub use classify::{classify, classify_for, is_blacklisted, Disposition};
pub use engine::{PolicyConfig, PolicyDecision, SuppressedResult, SyscallPolicy};
pub use remote::AutoRemoteSyscalls;
