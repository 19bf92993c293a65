//! DETOUR Core Types
//!
//! Architecture syscall tables, tracee register and signal models, and the
//! interfaces the diversion engine consumes from the tracing layer.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arch;
pub mod error;
pub mod event;
pub mod id;
pub mod registers;
pub mod remote_ptr;
pub mod signal;
pub mod syscalls;
pub mod task;

// Re-exports
pub use arch::Arch;
pub use error::{CoreError, CoreResult};
pub use event::PtraceEvent;
pub use id::{TaskId, VmId};
pub use registers::{Registers, SYSCALL_ARG_COUNT};
pub use remote_ptr::{preload_globals, RemotePtr};
pub use signal::{SigInfo, Signal};
pub use syscalls::{syscall_entries, syscall_name, syscall_number, ArchSyscalls, SyscallId};
pub use task::{RemoteInjector, ResumeHow, ResumeRequest, Task, TickBudget, Tracee};
