//! Interfaces the engine consumes from the tracing layer.
//!
//! [`Task`] is the accessor surface over one ptrace-controlled thread.
//! [`RemoteInjector`] issues syscalls inside a tracee on the tracer's behalf.
//! Both are implemented outside this workspace for live tracees and by
//! `detour_sim` for tests.

use crate::arch::Arch;
use crate::error::CoreResult;
use crate::event::PtraceEvent;
use crate::id::{TaskId, VmId};
use crate::registers::{Registers, SYSCALL_ARG_COUNT};
use crate::remote_ptr::RemotePtr;
use crate::signal::{SigInfo, Signal};
use serde::{Deserialize, Serialize};

/// ptrace request used to resume a diverted tracee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeHow {
    /// `PTRACE_SYSEMU`: stop at syscall entry without executing the syscall
    Sysemu,
    /// `PTRACE_SYSEMU_SINGLESTEP`
    SysemuSinglestep,
}

/// How many retired conditional branches the tracee may execute before the
/// tracer interrupts it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickBudget {
    /// Never interrupt
    #[default]
    Unlimited,
    /// Interrupt after this many ticks
    Limited(u64),
}

/// A single resume request. The tracer always blocks until the next stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeRequest {
    /// ptrace request
    pub how: ResumeHow,
    /// Tick budget
    pub ticks: TickBudget,
    /// Signal to deliver on resume
    pub sig: Option<Signal>,
}

impl ResumeRequest {
    /// Resume with `how`, wait for the stop, unlimited ticks, no signal
    #[must_use]
    pub fn new(how: ResumeHow) -> Self {
        Self {
            how,
            ticks: TickBudget::Unlimited,
            sig: None,
        }
    }

    /// Set the tick budget
    #[must_use]
    pub fn with_ticks(mut self, ticks: TickBudget) -> Self {
        self.ticks = ticks;
        self
    }

    /// Set the signal to deliver
    #[must_use]
    pub fn with_signal(mut self, sig: Option<Signal>) -> Self {
        self.sig = sig;
        self
    }
}

/// Accessor surface over one traced thread
pub trait Task {
    /// Kernel tid
    fn tid(&self) -> TaskId;

    /// Address space this task runs in
    fn vm(&self) -> VmId;

    /// Architecture of the tracee (may differ from the tracer's)
    fn arch(&self) -> Arch;

    /// Current register snapshot
    fn regs(&self) -> &Registers;

    /// Replace the register snapshot; written back before the next resume
    fn set_regs(&mut self, regs: Registers);

    /// Event the last stop was reported with
    fn ptrace_event(&self) -> PtraceEvent;

    /// Signal the task is stopped with, `None` at syscall and event stops
    fn stop_sig(&self) -> Option<Signal>;

    /// siginfo of the pending stop signal
    fn siginfo(&self) -> Option<SigInfo>;

    /// Whether the syscall at this entry stop is the preload library's
    /// arm/disarm-desched-event ioctl
    fn is_desched_event_syscall(&self) -> bool;

    /// Base of the preload globals block, if the preload library is mapped
    fn preload_globals(&self) -> Option<RemotePtr>;

    /// Write one byte of tracee memory
    ///
    /// # Errors
    ///
    /// Returns error if the address is not mapped writable
    fn write_u8(&mut self, addr: RemotePtr, value: u8) -> CoreResult<()>;

    /// Whether the syscall buffer is locked against use by the tracee
    fn syscallbuf_locked(&self) -> bool;

    /// Lock or unlock the syscall buffer
    fn set_syscallbuf_locked(&mut self, locked: bool);

    /// Resume the tracee
    ///
    /// # Errors
    ///
    /// Returns error if ptrace or waitpid fail
    fn resume_execution(&mut self, request: ResumeRequest) -> CoreResult<()>;

    /// Move the task past the syscall it is stopped at the entry of, without
    /// the kernel executing it
    ///
    /// # Errors
    ///
    /// Returns error if the task is not at a syscall entry stop
    fn finish_emulated_syscall(&mut self) -> CoreResult<()>;

    /// Record that the task has been killed and must not be waited on again
    fn did_kill(&mut self);

    /// Release ptrace control
    ///
    /// # Errors
    ///
    /// Returns error if `PTRACE_DETACH` fails for a reason other than the
    /// task already being gone
    fn detach(&mut self) -> CoreResult<()>;

    /// Send SIGKILL and reap the task
    ///
    /// # Errors
    ///
    /// Returns error if the task could not be killed
    fn kill(&mut self) -> CoreResult<()>;
}

/// Facility for injecting syscalls into a stopped tracee
pub trait RemoteInjector {
    /// State saved while a remote call is in progress
    type Site;

    /// Prepare the tracee for injection: save registers and wait status,
    /// point the ip at a syscall instruction
    ///
    /// # Errors
    ///
    /// Returns error if the tracee cannot be prepared
    fn begin_remote_call(&mut self) -> CoreResult<Self::Site>;

    /// Run one syscall and return its raw result
    ///
    /// # Errors
    ///
    /// Returns error if the tracee did not reach the syscall exit
    fn inject_syscall(
        &mut self,
        site: &Self::Site,
        syscallno: i64,
        args: [u64; SYSCALL_ARG_COUNT],
    ) -> CoreResult<i64>;

    /// Undo everything `begin_remote_call` changed and install `regs`
    fn end_remote_call(&mut self, site: Self::Site, regs: &Registers);
}

/// A traced task that also supports remote syscalls
pub trait Tracee: Task + RemoteInjector {}

impl<T: Task + RemoteInjector> Tracee for T {}
