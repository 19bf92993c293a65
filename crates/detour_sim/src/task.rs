//! Simulated tracee.

use crate::kernel::SimKernel;
use crate::record::{SharedRecord, SimEvent};
use crate::stop::SimStop;
use detour_core::{
    Arch, CoreError, CoreResult, PtraceEvent, Registers, RemoteInjector, RemotePtr,
    ResumeRequest, SigInfo, Signal, Task, TaskId, VmId, SYSCALL_ARG_COUNT,
};
use std::collections::{BTreeMap, VecDeque};
use tracing::trace;

/// Size of the preload globals block mapped into a simulated tracee
pub const PRELOAD_GLOBALS_SIZE: u64 = 64;

/// A syscall that reached the simulated live kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedSyscall {
    /// Number
    pub syscallno: i64,
    /// Arguments
    pub args: [u64; SYSCALL_ARG_COUNT],
    /// Kernel result
    pub ret: i64,
}

/// State saved by [`SimTask::begin_remote_call`]
#[derive(Debug)]
pub struct SimSite {
    saved: Registers,
}

/// A traced thread whose stops come from a script and whose injected
/// syscalls run against a [`SimKernel`].
#[derive(Debug)]
pub struct SimTask {
    tid: TaskId,
    vm: VmId,
    arch: Arch,
    regs: Registers,
    event: PtraceEvent,
    stop_sig: Option<Signal>,
    siginfo: Option<SigInfo>,
    at_syscall_entry: bool,
    desched: bool,
    preload_globals: Option<RemotePtr>,
    memory: BTreeMap<u64, u8>,
    syscallbuf_locked: bool,
    script: VecDeque<SimStop>,
    kernel: SimKernel,
    resumes: Vec<ResumeRequest>,
    injected: Vec<InjectedSyscall>,
    finished_emulated: usize,
    remote_calls: usize,
    in_remote_call: bool,
    killed: bool,
    did_kill: bool,
    detached: bool,
    record: Option<SharedRecord>,
}

impl SimTask {
    /// A task stopped with `regs`, in its own address space.
    ///
    /// A task whose `regs` carry a syscall number starts at that syscall's
    /// entry stop.
    #[must_use]
    pub fn new(tid: TaskId, arch: Arch, regs: Registers) -> Self {
        let at_syscall_entry = regs.original_syscallno() >= 0;
        Self {
            tid,
            vm: VmId::new(tid, 0),
            arch,
            regs,
            event: PtraceEvent::None,
            stop_sig: None,
            siginfo: None,
            at_syscall_entry,
            desched: false,
            preload_globals: None,
            memory: BTreeMap::new(),
            syscallbuf_locked: false,
            script: VecDeque::new(),
            kernel: SimKernel::new(),
            resumes: Vec::new(),
            injected: Vec::new(),
            finished_emulated: 0,
            remote_calls: 0,
            in_remote_call: false,
            killed: false,
            did_kill: false,
            detached: false,
            record: None,
        }
    }

    /// Set the live kernel
    #[must_use]
    pub fn with_kernel(mut self, kernel: SimKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Join address space `vm`
    #[must_use]
    pub fn with_vm(mut self, vm: VmId) -> Self {
        self.vm = vm;
        self
    }

    /// Map the preload globals block at `base`
    #[must_use]
    pub fn with_preload_globals(mut self, base: RemotePtr) -> Self {
        self.preload_globals = Some(base);
        self
    }

    /// Set whether the current syscall entry is the desched ioctl
    #[must_use]
    pub fn with_desched_ioctl(mut self, desched: bool) -> Self {
        self.desched = desched;
        self
    }

    /// Start at a signal stop instead of a syscall entry
    #[must_use]
    pub fn with_stop_sig(mut self, sig: Option<Signal>) -> Self {
        self.stop_sig = sig;
        self.siginfo = sig.map(|s| SigInfo::new(s, 0));
        if sig.is_some() {
            self.at_syscall_entry = false;
        }
        self
    }

    /// Set the pending ptrace event
    #[must_use]
    pub fn with_event(mut self, event: PtraceEvent) -> Self {
        self.event = event;
        self
    }

    /// Queue the stops reached on successive resumes
    #[must_use]
    pub fn with_script(mut self, stops: impl IntoIterator<Item = SimStop>) -> Self {
        self.script.extend(stops);
        self
    }

    /// Append observed events to `record`
    #[must_use]
    pub fn with_record(mut self, record: SharedRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Syscalls that reached the live kernel
    #[must_use]
    pub fn injected(&self) -> &[InjectedSyscall] {
        &self.injected
    }

    /// Resume requests received
    #[must_use]
    pub fn resumes(&self) -> &[ResumeRequest] {
        &self.resumes
    }

    /// How many times an emulated syscall entry was closed out
    #[must_use]
    pub fn finished_emulated_syscalls(&self) -> usize {
        self.finished_emulated
    }

    /// How many remote calls have been started
    #[must_use]
    pub fn remote_call_count(&self) -> usize {
        self.remote_calls
    }

    /// Whether a remote call is in progress
    #[must_use]
    pub fn in_remote_call(&self) -> bool {
        self.in_remote_call
    }

    /// Byte at `addr`, if it has been written
    #[must_use]
    pub fn read_u8(&self, addr: RemotePtr) -> Option<u8> {
        self.memory.get(&addr.as_u64()).copied()
    }

    /// Whether the task was killed
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Whether the task was marked as killed
    #[must_use]
    pub fn kill_recorded(&self) -> bool {
        self.did_kill
    }

    /// Whether the task was detached
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Stops left in the script
    #[must_use]
    pub fn remaining_stops(&self) -> usize {
        self.script.len()
    }

    fn emit(&self, event: SimEvent) {
        if let Some(record) = &self.record {
            record.borrow_mut().push(event);
        }
    }

    fn enter_stop(&mut self, stop: SimStop) -> CoreResult<()> {
        self.event = PtraceEvent::None;
        self.stop_sig = None;
        self.siginfo = None;
        self.at_syscall_entry = false;
        self.desched = false;
        match stop {
            SimStop::SyscallEntry {
                syscall,
                args,
                desched,
                ip,
            } => {
                let syscallno = syscall.resolve(self.arch)?;
                let mut regs = Registers::at_syscall_entry(self.regs.arch(), syscallno, args)
                    .with_ip(ip.unwrap_or_else(|| self.regs.ip().as_u64()))
                    .with_sp(self.regs.sp().as_u64());
                // -ENOSYS is what the kernel leaves in the result register at entry
                regs.set_syscall_result(-38);
                self.regs = regs;
                self.at_syscall_entry = true;
                self.desched = desched;
            }
            SimStop::Signal { siginfo, ip } => {
                if let Some(ip) = ip {
                    self.regs.set_ip(RemotePtr::new(ip));
                }
                self.regs.set_original_syscallno(-1);
                self.stop_sig = Some(siginfo.signo);
                self.siginfo = Some(siginfo);
            }
            SimStop::Exit => self.event = PtraceEvent::Exit,
        }
        Ok(())
    }

    fn in_preload_globals(&self, addr: RemotePtr) -> bool {
        self.preload_globals.is_some_and(|base| {
            (base.as_u64()..base.as_u64() + PRELOAD_GLOBALS_SIZE).contains(&addr.as_u64())
        })
    }
}

impl Task for SimTask {
    fn tid(&self) -> TaskId {
        self.tid
    }

    fn vm(&self) -> VmId {
        self.vm
    }

    fn arch(&self) -> Arch {
        self.arch
    }

    fn regs(&self) -> &Registers {
        &self.regs
    }

    fn set_regs(&mut self, regs: Registers) {
        self.regs = regs;
    }

    fn ptrace_event(&self) -> PtraceEvent {
        self.event
    }

    fn stop_sig(&self) -> Option<Signal> {
        self.stop_sig
    }

    fn siginfo(&self) -> Option<SigInfo> {
        self.siginfo.clone()
    }

    fn is_desched_event_syscall(&self) -> bool {
        self.at_syscall_entry && self.desched
    }

    fn preload_globals(&self) -> Option<RemotePtr> {
        self.preload_globals
    }

    fn write_u8(&mut self, addr: RemotePtr, value: u8) -> CoreResult<()> {
        if !self.in_preload_globals(addr) {
            return Err(CoreError::MemoryFault {
                tid: self.tid,
                addr,
            });
        }
        self.memory.insert(addr.as_u64(), value);
        self.emit(SimEvent::WroteMemory {
            tid: self.tid,
            addr,
            value,
        });
        Ok(())
    }

    fn syscallbuf_locked(&self) -> bool {
        self.syscallbuf_locked
    }

    fn set_syscallbuf_locked(&mut self, locked: bool) {
        self.syscallbuf_locked = locked;
    }

    fn resume_execution(&mut self, request: ResumeRequest) -> CoreResult<()> {
        if self.killed || self.detached {
            return Err(CoreError::TaskDied { tid: self.tid });
        }
        self.resumes.push(request);
        self.emit(SimEvent::Resumed {
            tid: self.tid,
            how: request.how,
            sig: request.sig,
        });
        // A tracee with nothing left to do runs to exit
        let stop = self.script.pop_front().unwrap_or(SimStop::Exit);
        trace!(tid = %self.tid, ?stop, "simulated stop");
        self.enter_stop(stop)
    }

    fn finish_emulated_syscall(&mut self) -> CoreResult<()> {
        if !self.at_syscall_entry {
            return Err(CoreError::InvalidStop {
                tid: self.tid,
                expected: "a syscall-entry stop".to_string(),
            });
        }
        self.at_syscall_entry = false;
        self.finished_emulated += 1;
        self.emit(SimEvent::FinishedEmulatedSyscall { tid: self.tid });
        Ok(())
    }

    fn did_kill(&mut self) {
        self.did_kill = true;
    }

    fn detach(&mut self) -> CoreResult<()> {
        self.detached = true;
        self.emit(SimEvent::Detached { tid: self.tid });
        Ok(())
    }

    fn kill(&mut self) -> CoreResult<()> {
        if !self.killed {
            self.killed = true;
            self.event = PtraceEvent::Exit;
            self.emit(SimEvent::Killed { tid: self.tid });
        }
        Ok(())
    }
}

impl RemoteInjector for SimTask {
    type Site = SimSite;

    fn begin_remote_call(&mut self) -> CoreResult<SimSite> {
        if self.killed {
            return Err(CoreError::TaskDied { tid: self.tid });
        }
        if self.in_remote_call {
            return Err(CoreError::InjectionFailed {
                tid: self.tid,
                reason: "remote call already in progress".to_string(),
            });
        }
        self.in_remote_call = true;
        self.remote_calls += 1;
        Ok(SimSite {
            saved: self.regs.clone(),
        })
    }

    fn inject_syscall(
        &mut self,
        _site: &SimSite,
        syscallno: i64,
        args: [u64; SYSCALL_ARG_COUNT],
    ) -> CoreResult<i64> {
        if !self.in_remote_call {
            return Err(CoreError::InjectionFailed {
                tid: self.tid,
                reason: "no remote call in progress".to_string(),
            });
        }
        let ret = self.kernel.execute(self.arch, self.tid, syscallno, args);
        self.injected.push(InjectedSyscall {
            syscallno,
            args,
            ret,
        });
        self.emit(SimEvent::Injected {
            tid: self.tid,
            syscallno,
            args,
            ret,
        });
        Ok(ret)
    }

    fn end_remote_call(&mut self, site: SimSite, regs: &Registers) {
        let mut regs = regs.clone();
        regs.set_ip(site.saved.ip());
        regs.set_sp(site.saved.sp());
        self.regs = regs;
        self.in_remote_call = false;
    }
}

impl Drop for SimTask {
    fn drop(&mut self) {
        self.emit(SimEvent::Dropped { tid: self.tid });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SimRecord;
    use detour_core::{preload_globals, ResumeHow};

    fn task() -> SimTask {
        SimTask::new(TaskId::new(10), Arch::X86_64, Registers::new(Arch::X86_64).with_ip(0x1000))
    }

    #[test]
    fn test_script_drives_stops() {
        let mut task = task().with_script([
            SimStop::syscall("write", [1, 0x2000, 4, 0, 0, 0]),
            SimStop::signal(SigInfo::new(Signal::SIGSEGV, 1)),
        ]);

        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert_eq!(task.regs().original_syscallno(), 1);
        assert_eq!(task.regs().arg(3), 4);
        assert_eq!(task.stop_sig(), None);

        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert_eq!(task.stop_sig(), Some(Signal::SIGSEGV));
        assert_eq!(task.regs().ip().as_u64(), 0x1000);

        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert_eq!(task.ptrace_event(), PtraceEvent::Exit);
        assert_eq!(task.resumes().len(), 3);
    }

    #[test]
    fn test_finish_emulated_requires_syscall_entry() {
        let mut task = task().with_script([SimStop::signal(SigInfo::new(Signal::SIGTRAP, 0))]);
        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert!(matches!(
            task.finish_emulated_syscall(),
            Err(CoreError::InvalidStop { .. })
        ));
    }

    #[test]
    fn test_desched_only_at_the_flagged_entry() {
        let mut task = task().with_script([
            SimStop::desched_ioctl([5, 0, 0, 0, 0, 0]),
            SimStop::syscall("ioctl", [5, 0, 0, 0, 0, 0]),
        ]);
        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert!(task.is_desched_event_syscall());
        task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)).unwrap();
        assert!(!task.is_desched_event_syscall());
    }

    #[test]
    fn test_write_outside_preload_globals_faults() {
        let base = RemotePtr::new(0x7000_0000);
        let mut task = task().with_preload_globals(base);
        task.write_u8(base.field(preload_globals::IN_DIVERSION), 1).unwrap();
        assert_eq!(task.read_u8(base.field(preload_globals::IN_DIVERSION)), Some(1));

        let err = task.write_u8(RemotePtr::new(0x10), 1).unwrap_err();
        assert!(matches!(err, CoreError::MemoryFault { .. }));
    }

    #[test]
    fn test_killed_task_cannot_resume() {
        let mut task = task();
        task.kill().unwrap();
        assert!(task.is_killed());
        assert!(matches!(
            task.resume_execution(ResumeRequest::new(ResumeHow::Sysemu)),
            Err(CoreError::TaskDied { .. })
        ));
    }

    #[test]
    fn test_nested_remote_call_rejected() {
        let mut task = task();
        let site = task.begin_remote_call().unwrap();
        assert!(task.begin_remote_call().is_err());
        let regs = task.regs().clone();
        task.end_remote_call(site, &regs);
        assert!(!task.in_remote_call());
    }

    #[test]
    fn test_record_sees_drop() {
        let record = SimRecord::shared();
        {
            let mut task = task().with_record(record.clone());
            task.kill().unwrap();
            task.did_kill();
            task.detach().unwrap();
        }
        let record = record.borrow();
        assert!(record.was_dropped(TaskId::new(10)));
        assert_eq!(record.event_count(), 3);
    }
}
