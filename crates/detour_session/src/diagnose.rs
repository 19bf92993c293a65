//! Turning a stop into a debugger-visible break status.

use crate::result::{BreakStatus, RunCommand};
use detour_core::{RemotePtr, Signal, Task};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Classifies stops for the debugger
pub trait TrapDiagnoser<T: Task + ?Sized> {
    /// Break status for a signal stop of `task` during a step run with
    /// `command`
    fn diagnose_debugger_trap(&mut self, task: &T, command: RunCommand) -> BreakStatus;

    /// Add watchpoints whose value changed since the last check to `status`
    fn check_for_watchpoint_changes(&mut self, task: &T, status: &mut BreakStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watch {
    reported: u64,
    current: u64,
}

/// Software breakpoints by address and value watches maintained by the caller
#[derive(Debug, Clone, Default)]
pub struct BreakpointDiagnoser {
    breakpoints: BTreeSet<RemotePtr>,
    watches: IndexMap<RemotePtr, Watch>,
}

impl BreakpointDiagnoser {
    /// No breakpoints or watches
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint at `addr`
    #[must_use]
    pub fn with_breakpoint(mut self, addr: RemotePtr) -> Self {
        self.add_breakpoint(addr);
        self
    }

    /// Add a breakpoint at `addr`
    pub fn add_breakpoint(&mut self, addr: RemotePtr) {
        self.breakpoints.insert(addr);
    }

    /// Remove the breakpoint at `addr`
    pub fn remove_breakpoint(&mut self, addr: RemotePtr) -> bool {
        self.breakpoints.remove(&addr)
    }

    /// Watch `addr`, whose value is currently `value`
    pub fn add_watchpoint(&mut self, addr: RemotePtr, value: u64) {
        self.watches.insert(
            addr,
            Watch {
                reported: value,
                current: value,
            },
        );
    }

    /// Record the latest value at a watched address. Unwatched addresses are
    /// ignored.
    pub fn update_watched_value(&mut self, addr: RemotePtr, value: u64) {
        if let Some(watch) = self.watches.get_mut(&addr) {
            watch.current = value;
        }
    }

    /// Whether a breakpoint is set at `addr`
    #[must_use]
    pub fn has_breakpoint(&self, addr: RemotePtr) -> bool {
        self.breakpoints.contains(&addr)
    }
}

impl<T: Task + ?Sized> TrapDiagnoser<T> for BreakpointDiagnoser {
    fn diagnose_debugger_trap(&mut self, task: &T, command: RunCommand) -> BreakStatus {
        let mut status = BreakStatus::default();
        if task.stop_sig() == Some(Signal::SIGTRAP) {
            // The trap leaves ip past the breakpoint instruction
            let ip = task.regs().ip().as_u64();
            let bp = RemotePtr::new(ip.wrapping_sub(task.arch().breakpoint_ip_adjust()));
            status.breakpoint_hit = self.breakpoints.contains(&bp);
            status.singlestep_complete = command == RunCommand::SingleStep;
        }
        self.check_for_watchpoint_changes(task, &mut status);
        if !status.any_break() {
            status.signal = task.siginfo();
        }
        status
    }

    fn check_for_watchpoint_changes(&mut self, _task: &T, status: &mut BreakStatus) {
        for (addr, watch) in &mut self.watches {
            if watch.current != watch.reported {
                watch.reported = watch.current;
                status.watchpoints_hit.push(*addr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::{Arch, Registers, SigInfo, TaskId};
    use detour_sim::SimTask;

    fn stopped_at(arch: Arch, ip: u64, sig: Signal) -> SimTask {
        SimTask::new(TaskId::new(1), arch, Registers::new(arch).with_ip(ip)).with_stop_sig(Some(sig))
    }

    #[test]
    fn test_breakpoint_hit_adjusts_ip() {
        let mut diagnoser = BreakpointDiagnoser::new().with_breakpoint(RemotePtr::new(0x40_1000));
        let task = stopped_at(Arch::X86_64, 0x40_1001, Signal::SIGTRAP);
        let status = diagnoser.diagnose_debugger_trap(&task, RunCommand::Continue);
        assert!(status.breakpoint_hit);
        assert!(!status.singlestep_complete);
        assert!(status.signal.is_none());
    }

    #[test]
    fn test_aarch64_breakpoint_no_adjust() {
        let mut diagnoser = BreakpointDiagnoser::new().with_breakpoint(RemotePtr::new(0x40_1000));
        let task = stopped_at(Arch::Aarch64, 0x40_1000, Signal::SIGTRAP);
        let status = diagnoser.diagnose_debugger_trap(&task, RunCommand::Continue);
        assert!(status.breakpoint_hit);
    }

    #[test]
    fn test_singlestep_complete_only_for_singlestep() {
        let mut diagnoser = BreakpointDiagnoser::new();
        let task = stopped_at(Arch::X86_64, 0x2000, Signal::SIGTRAP);
        let status = diagnoser.diagnose_debugger_trap(&task, RunCommand::SingleStep);
        assert!(status.singlestep_complete);

        let status = diagnoser.diagnose_debugger_trap(&task, RunCommand::Continue);
        assert!(!status.singlestep_complete);
        // an unexplained SIGTRAP goes to the debugger as a signal
        assert_eq!(status.signal.map(|s| s.signo), Some(Signal::SIGTRAP));
    }

    #[test]
    fn test_segv_reported_as_signal() {
        let mut diagnoser = BreakpointDiagnoser::new();
        let task = stopped_at(Arch::X86_64, 0x2000, Signal::SIGSEGV);
        let status = diagnoser.diagnose_debugger_trap(&task, RunCommand::Continue);
        assert!(!status.breakpoint_hit);
        assert_eq!(status.signal, Some(SigInfo::new(Signal::SIGSEGV, 0)));
    }

    #[test]
    fn test_watchpoint_reported_once() {
        let mut diagnoser = BreakpointDiagnoser::new();
        let addr = RemotePtr::new(0x60_0000);
        diagnoser.add_watchpoint(addr, 1);
        let task = SimTask::new(TaskId::new(1), Arch::X86_64, Registers::new(Arch::X86_64));

        let mut status = BreakStatus::default();
        diagnoser.check_for_watchpoint_changes(&task, &mut status);
        assert!(status.watchpoints_hit.is_empty());

        diagnoser.update_watched_value(addr, 2);
        diagnoser.check_for_watchpoint_changes(&task, &mut status);
        assert_eq!(status.watchpoints_hit, vec![addr]);

        let mut status = BreakStatus::default();
        diagnoser.check_for_watchpoint_changes(&task, &mut status);
        assert!(status.watchpoints_hit.is_empty());
    }
}
