//! Diversion session: the tasks being diverted and what they share.

use crate::address_space::{AddressSpace, VmMap};
use crate::config::DiversionConfig;
use crate::diagnose::{BreakpointDiagnoser, TrapDiagnoser};
use crate::diagnostics::{AbortOnViolation, Diagnostics};
use crate::emufs::{EmuFile, EmuFs, FileKey};
use crate::error::{ContractViolation, DiversionError, SessionResult};
use crate::result::{DiversionResult, RunCommand};
use crate::step::{check_command, Stepper};
use detour_core::{CoreError, Signal, TaskId, Tracee, VmId};
use detour_policy::SyscallPolicy;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::{debug_span, info, warn};

struct TaskEntry<T> {
    task: T,
    // Backing files of the task's emulated descriptors
    emu_files: Vec<Rc<EmuFile>>,
}

/// A set of tasks running live, detached from the recording they were
/// replaying.
///
/// Tasks are owned by the session. A task that exits during a step, or is
/// killed by [`kill_all_tasks`](Self::kill_all_tasks), is detached and
/// dropped on the spot. Dropping the session kills whatever is left.
pub struct DiversionSession<T: Tracee, D: TrapDiagnoser<T> = BreakpointDiagnoser> {
    config: DiversionConfig,
    policy: SyscallPolicy,
    diagnoser: D,
    diagnostics: Box<dyn Diagnostics>,
    tasks: IndexMap<TaskId, TaskEntry<T>>,
    vms: VmMap,
    emu_fs: EmuFs,
    fully_initialized: bool,
    torn_down: bool,
}

impl<T: Tracee> DiversionSession<T, BreakpointDiagnoser> {
    /// Empty session with the default diagnoser, aborting on contract
    /// violations
    #[must_use]
    pub fn new(config: DiversionConfig) -> Self {
        Self::with_diagnoser(config, BreakpointDiagnoser::new())
    }
}

impl<T: Tracee, D: TrapDiagnoser<T>> DiversionSession<T, D> {
    /// Empty session using `diagnoser` for trap diagnosis
    #[must_use]
    pub fn with_diagnoser(config: DiversionConfig, diagnoser: D) -> Self {
        info!("creating diversion session");
        let policy = SyscallPolicy::new().with_config(config.policy.clone());
        Self {
            config,
            policy,
            diagnoser,
            diagnostics: Box::new(AbortOnViolation),
            tasks: IndexMap::new(),
            vms: VmMap::new(),
            emu_fs: EmuFs::new(),
            fully_initialized: false,
            torn_down: false,
        }
    }

    /// Send contract violations to `diagnostics`
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &DiversionConfig {
        &self.config
    }

    /// Add a traced task.
    ///
    /// The session must be re-initialized with
    /// [`finish_initializing`](Self::finish_initializing) before stepping.
    ///
    /// # Errors
    ///
    /// Returns error if a task with the same tid is already in the session
    pub fn adopt_task(&mut self, task: T) -> SessionResult<()> {
        let tid = task.tid();
        if self.tasks.contains_key(&tid) {
            return Err(CoreError::AlreadyExists {
                kind: "Task".to_string(),
                id: tid.to_string(),
            }
            .into());
        }
        self.vms.join(task.vm(), tid);
        self.tasks.insert(
            tid,
            TaskEntry {
                task,
                emu_files: Vec::new(),
            },
        );
        self.fully_initialized = false;
        Ok(())
    }

    /// Mark the session ready for stepping.
    ///
    /// Every address space must be resolved, i.e. its leader task must have
    /// been adopted.
    ///
    /// # Errors
    ///
    /// Returns error if some address space's leader was never adopted; the
    /// session stays uninitialized
    pub fn finish_initializing(&mut self) -> SessionResult<()> {
        if let Some(vm) = self.vms.unresolved().next() {
            warn!(%vm, "address space leader not adopted");
            return Err(CoreError::NotFound {
                kind: "Address space leader".to_string(),
                id: vm.to_string(),
            }
            .into());
        }
        self.fully_initialized = true;
        info!(tasks = self.tasks.len(), vms = self.vms.len(), "diversion session initialized");
        Ok(())
    }

    /// Whether [`finish_initializing`](Self::finish_initializing) has run
    /// since the last task was adopted
    #[must_use]
    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    /// Open the emulated file `key` on behalf of `tid`, creating it if no
    /// task has it open. The task keeps it alive until it leaves the session.
    ///
    /// # Errors
    ///
    /// Returns error if `tid` is not in the session
    pub fn open_emulated_file(
        &mut self,
        tid: TaskId,
        key: FileKey,
        name: &str,
        size: u64,
    ) -> SessionResult<Rc<EmuFile>> {
        let entry = self
            .tasks
            .get_mut(&tid)
            .ok_or(DiversionError::TaskNotFound(tid))?;
        let file = self.emu_fs.get_or_create(key, name, size);
        entry.emu_files.push(Rc::clone(&file));
        Ok(file)
    }

    /// Emulated files task `tid` holds open
    #[must_use]
    pub fn emulated_files(&self, tid: TaskId) -> Option<&[Rc<EmuFile>]> {
        self.tasks.get(&tid).map(|entry| entry.emu_files.as_slice())
    }

    /// Run task `tid` for one step with `command`, delivering `signal` on
    /// resume.
    ///
    /// A task that exits during the step is removed from the session before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns error if the task is unknown, a contract is violated, or the
    /// tracee could not be operated on
    pub fn diversion_step(
        &mut self,
        tid: TaskId,
        command: RunCommand,
        signal: Option<Signal>,
    ) -> SessionResult<DiversionResult> {
        let _span = debug_span!("diversion_step", %tid, %command).entered();

        if let Err(violation) = check_command(tid, command) {
            return Err(self.report(violation));
        }
        if !self.fully_initialized {
            return Err(self.report(ContractViolation::NotFullyInitialized { tid }));
        }
        let entry = self
            .tasks
            .get_mut(&tid)
            .ok_or(DiversionError::TaskNotFound(tid))?;

        let result = Stepper {
            config: &self.config,
            policy: &self.policy,
            diagnoser: &mut self.diagnoser,
            diagnostics: self.diagnostics.as_ref(),
        }
        .step(&mut entry.task, command, signal)?;

        if result.is_exited() {
            self.remove_task(tid);
        }
        Ok(result)
    }

    /// Kill, detach and drop every task
    pub fn kill_all_tasks(&mut self) {
        let count = self.tasks.len();
        while let Some((tid, mut entry)) = self.tasks.shift_remove_index(0) {
            if let Err(err) = entry.task.kill() {
                warn!(%tid, %err, "kill failed");
            }
            entry.task.did_kill();
            if let Err(err) = entry.task.detach() {
                warn!(%tid, %err, "detach failed");
            }
            self.vms.leave(entry.task.vm(), tid);
        }
        self.emu_fs.gc();
        if count > 0 {
            info!(count, "killed diversion tasks");
        }
    }

    /// Kill every task, release the emulated filesystem and check that
    /// nothing leaked.
    ///
    /// # Errors
    ///
    /// Returns the first leak found; every leak is reported to the
    /// diagnostics reporter
    pub fn teardown(mut self) -> SessionResult<()> {
        match self.shutdown().into_iter().next() {
            Some(violation) => Err(DiversionError::Contract(violation)),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Vec<ContractViolation> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;

        self.kill_all_tasks();
        let live_files = self.emu_fs.size();
        self.emu_fs = EmuFs::new();

        let mut leaks = Vec::new();
        if !self.tasks.is_empty() {
            leaks.push(ContractViolation::LeakedTasks {
                count: self.tasks.len(),
            });
        }
        if self.vms.len() > 0 {
            leaks.push(ContractViolation::LeakedAddressSpaces {
                count: self.vms.len(),
            });
        }
        if live_files > 0 {
            leaks.push(ContractViolation::LeakedEmulatedFiles { count: live_files });
        }
        for leak in &leaks {
            self.diagnostics.report(leak);
        }
        info!(leaks = leaks.len(), "diversion session torn down");
        leaks
    }

    fn remove_task(&mut self, tid: TaskId) {
        if let Some(entry) = self.tasks.shift_remove(&tid) {
            if self.vms.leave(entry.task.vm(), tid) {
                info!(%tid, vm = %entry.task.vm(), "address space released");
            }
        }
        self.emu_fs.gc();
    }

    fn report(&self, violation: ContractViolation) -> DiversionError {
        self.diagnostics.report(&violation);
        DiversionError::Contract(violation)
    }

    /// Task `tid`, if still in the session
    #[must_use]
    pub fn task(&self, tid: TaskId) -> Option<&T> {
        self.tasks.get(&tid).map(|entry| &entry.task)
    }

    /// Mutable access to task `tid`
    pub fn task_mut(&mut self, tid: TaskId) -> Option<&mut T> {
        self.tasks.get_mut(&tid).map(|entry| &mut entry.task)
    }

    /// Tids of the tasks in the session, in adoption order
    pub fn tids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    /// Number of tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of address spaces
    #[must_use]
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Address space `vm`, if some task still runs in it
    #[must_use]
    pub fn vm(&self, vm: VmId) -> Option<&AddressSpace> {
        self.vms.get(vm)
    }

    /// The emulated filesystem
    #[must_use]
    pub fn emu_fs(&self) -> &EmuFs {
        &self.emu_fs
    }

    /// The trap diagnoser
    #[must_use]
    pub fn diagnoser(&self) -> &D {
        &self.diagnoser
    }

    /// Mutable access to the trap diagnoser, e.g. to set breakpoints
    pub fn diagnoser_mut(&mut self) -> &mut D {
        &mut self.diagnoser
    }
}

impl<T: Tracee, D: TrapDiagnoser<T>> Drop for DiversionSession<T, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CapturingDiagnostics;
    use crate::result::DiversionStatus;
    use detour_core::{Arch, PtraceEvent, Registers, ResumeHow, SigInfo, Task};
    use detour_policy::{PolicyConfig, SuppressedResult};
    use detour_sim::{SimEvent, SimKernel, SimRecord, SimStop, SimTask, SharedRecord};
    use proptest::prelude::*;

    fn tid(n: i32) -> TaskId {
        TaskId::new(n)
    }

    fn sim(n: i32, record: &SharedRecord, stops: Vec<SimStop>) -> SimTask {
        SimTask::new(tid(n), Arch::X86_64, Registers::new(Arch::X86_64).with_ip(0x40_0000))
            .with_script(stops)
            .with_record(record.clone())
    }

    fn session(diagnostics: &CapturingDiagnostics) -> DiversionSession<SimTask> {
        DiversionSession::new(DiversionConfig::default())
            .with_diagnostics(Box::new(diagnostics.clone()))
    }

    #[test]
    fn test_adopt_and_initialize() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        let leader = sim(1, &record, vec![]);
        let thread = sim(2, &record, vec![]).with_vm(VmId::new(tid(1), 0));
        s.adopt_task(leader).unwrap();
        s.adopt_task(thread).unwrap();
        s.adopt_task(sim(3, &record, vec![])).unwrap();
        assert_eq!(s.task_count(), 3);
        assert_eq!(s.vm_count(), 2);
        assert!(!s.is_fully_initialized());
        s.finish_initializing().unwrap();
        assert!(s.is_fully_initialized());
        assert_eq!(s.vm(VmId::new(tid(1), 0)).unwrap().task_count(), 2);
    }

    #[test]
    fn test_adopt_duplicate_tid() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![])).unwrap();
        let err = s.adopt_task(sim(1, &record, vec![])).unwrap_err();
        assert!(matches!(
            err,
            DiversionError::Core(CoreError::AlreadyExists { .. })
        ));
        assert_eq!(s.task_count(), 1);
    }

    #[test]
    fn test_step_before_initializing_is_violation() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![SimStop::syscall("getpid", [0; 6])]))
            .unwrap();
        let err = s
            .diversion_step(tid(1), RunCommand::Continue, None)
            .unwrap_err();
        assert!(matches!(
            err,
            DiversionError::Contract(ContractViolation::NotFullyInitialized { .. })
        ));
        assert!(record.borrow().resumes().is_empty());
        assert_eq!(diagnostics.violations().len(), 1);
    }

    #[test]
    fn test_unknown_tid() {
        let diagnostics = CapturingDiagnostics::new();
        let mut s = session(&diagnostics);
        s.finish_initializing().unwrap();
        let err = s
            .diversion_step(tid(77), RunCommand::Continue, None)
            .unwrap_err();
        assert_eq!(err, DiversionError::TaskNotFound(tid(77)));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_fast_forward_on_unknown_tid_is_still_violation() {
        let diagnostics = CapturingDiagnostics::new();
        let mut s = session(&diagnostics);
        s.finish_initializing().unwrap();
        let err = s
            .diversion_step(tid(77), RunCommand::SingleStepFastForward, None)
            .unwrap_err();
        assert!(matches!(err, DiversionError::Contract(_)));
    }

    #[test]
    fn test_kill_is_suppressed_end_to_end() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(
            100,
            &record,
            vec![SimStop::syscall("kill", [999, 9, 0, 0, 0, 0])],
        ))
        .unwrap();
        s.finish_initializing().unwrap();

        let result = s.diversion_step(tid(100), RunCommand::Continue, None).unwrap();
        assert_eq!(result.status, DiversionStatus::Continuing);
        assert!(!result.break_status.any_break());
        assert!(record.borrow().injected_syscalls().is_empty());
        let task = s.task(tid(100)).unwrap();
        assert_eq!(task.finished_emulated_syscalls(), 1);
        assert_eq!(task.regs().syscall_result_signed(), -38);
    }

    #[test]
    fn test_suppressed_sentinel_from_config() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let config = DiversionConfig::new().with_policy(
            PolicyConfig::new().with_suppressed_result(SuppressedResult::Sentinel(-1)),
        );
        let mut s: DiversionSession<SimTask> = DiversionSession::new(config)
            .with_diagnostics(Box::new(diagnostics.clone()));
        s.adopt_task(sim(5, &record, vec![SimStop::syscall("tgkill", [5, 5, 9, 0, 0, 0])]))
            .unwrap();
        s.finish_initializing().unwrap();
        s.diversion_step(tid(5), RunCommand::Continue, None).unwrap();
        assert_eq!(s.task(tid(5)).unwrap().regs().syscall_result_signed(), -1);
    }

    #[test]
    fn test_write_executes_end_to_end() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        let task = sim(
            100,
            &record,
            vec![SimStop::syscall("write", [3, 0x7f00_0000, 10, 0, 0, 0])],
        )
        .with_kernel(SimKernel::new().with_result(1, 10));
        s.adopt_task(task).unwrap();
        s.finish_initializing().unwrap();

        s.diversion_step(tid(100), RunCommand::Continue, None).unwrap();
        assert_eq!(record.borrow().injected_syscalls(), vec![(tid(100), 1)]);
        let task = s.task(tid(100)).unwrap();
        assert_eq!(task.regs().syscall_result_signed(), 10);
        assert_eq!(task.injected()[0].args, [3, 0x7f00_0000, 10, 0, 0, 0]);
    }

    #[test]
    fn test_desched_ioctl_end_to_end() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(100, &record, vec![SimStop::desched_ioctl([4, 0x2400, 0, 0, 0, 0])]))
            .unwrap();
        s.finish_initializing().unwrap();

        s.diversion_step(tid(100), RunCommand::Continue, None).unwrap();
        assert!(record.borrow().injected_syscalls().is_empty());
        assert_eq!(s.task(tid(100)).unwrap().regs().syscall_result(), 0);
    }

    #[test]
    fn test_segv_under_continue() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(
            100,
            &record,
            vec![SimStop::signal(SigInfo::new(Signal::SIGSEGV, 1).with_addr(0))],
        ))
        .unwrap();
        s.finish_initializing().unwrap();

        let result = s.diversion_step(tid(100), RunCommand::Continue, None).unwrap();
        assert_eq!(result.status, DiversionStatus::Continuing);
        assert_eq!(
            result.break_status.signal.as_ref().map(|s| s.signo),
            Some(Signal::SIGSEGV)
        );
        assert_eq!(s.task(tid(100)).unwrap().finished_emulated_syscalls(), 0);
    }

    #[test]
    fn test_exit_removes_task_and_vm() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(100, &record, vec![SimStop::Exit])).unwrap();
        s.finish_initializing().unwrap();

        let result = s.diversion_step(tid(100), RunCommand::Continue, None).unwrap();
        assert!(result.is_exited());
        assert!(s.task(tid(100)).is_none());
        assert_eq!(s.task_count(), 0);
        assert_eq!(s.vm_count(), 0);
        assert!(record.borrow().was_dropped(tid(100)));

        let err = s
            .diversion_step(tid(100), RunCommand::Continue, None)
            .unwrap_err();
        assert_eq!(err, DiversionError::TaskNotFound(tid(100)));
    }

    #[test]
    fn test_pending_exit_removes_without_resume() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(100, &record, vec![]).with_event(PtraceEvent::Exit))
            .unwrap();
        s.finish_initializing().unwrap();

        let result = s.diversion_step(tid(100), RunCommand::SingleStep, None).unwrap();
        assert!(result.is_exited());
        assert!(record.borrow().resumes().is_empty());
        assert!(record.borrow().was_dropped(tid(100)));
    }

    #[test]
    fn test_exit_keeps_shared_vm() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        let vm = VmId::new(tid(1), 0);
        s.adopt_task(sim(1, &record, vec![])).unwrap();
        s.adopt_task(sim(2, &record, vec![SimStop::Exit]).with_vm(vm)).unwrap();
        s.finish_initializing().unwrap();

        s.diversion_step(tid(2), RunCommand::Continue, None).unwrap();
        assert_eq!(s.vm_count(), 1);
        assert_eq!(s.vm(vm).unwrap().task_count(), 1);
    }

    #[test]
    fn test_exit_releases_emulated_files() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![SimStop::Exit])).unwrap();
        s.adopt_task(sim(2, &record, vec![])).unwrap();
        s.finish_initializing().unwrap();

        let key = FileKey::new(8, 42);
        drop(s.open_emulated_file(tid(1), key, "/var/log/app.log", 4096).unwrap());
        drop(s.open_emulated_file(tid(2), key, "/var/log/app.log", 4096).unwrap());
        assert_eq!(s.emu_fs().size(), 1);
        assert_eq!(s.emulated_files(tid(2)).unwrap()[0].name(), "/var/log/app.log");

        s.diversion_step(tid(1), RunCommand::Continue, None).unwrap();
        assert_eq!(s.emu_fs().size(), 1);
        s.kill_all_tasks();
        assert_eq!(s.emu_fs().size(), 0);
    }

    #[test]
    fn test_exit_forgets_dead_emulated_files() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![SimStop::Exit])).unwrap();
        s.adopt_task(sim(2, &record, vec![])).unwrap();
        s.finish_initializing().unwrap();

        drop(s.open_emulated_file(tid(1), FileKey::new(8, 1), "/tmp/a", 1).unwrap());
        drop(s.open_emulated_file(tid(2), FileKey::new(8, 2), "/tmp/b", 1).unwrap());
        assert_eq!(s.emu_fs().tracked(), 2);

        s.diversion_step(tid(1), RunCommand::Continue, None).unwrap();
        assert_eq!(s.emu_fs().tracked(), 1);
        assert!(s.emu_fs().find(FileKey::new(8, 1)).is_none());

        s.kill_all_tasks();
        assert_eq!(s.emu_fs().tracked(), 0);
    }

    #[test]
    fn test_initializing_requires_vm_leaders() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        let vm = VmId::new(tid(1000), 7);
        for n in 1..=3 {
            s.adopt_task(sim(n, &record, vec![]).with_vm(vm)).unwrap();
        }

        let err = s.finish_initializing().unwrap_err();
        assert!(matches!(
            err,
            DiversionError::Core(CoreError::NotFound { .. })
        ));
        assert!(!s.is_fully_initialized());
        assert!(!s.vm(vm).unwrap().is_resolved());

        let err = s.diversion_step(tid(1), RunCommand::Continue, None).unwrap_err();
        assert!(matches!(
            err,
            DiversionError::Contract(ContractViolation::NotFullyInitialized { .. })
        ));

        s.adopt_task(sim(1000, &record, vec![]).with_vm(vm)).unwrap();
        s.finish_initializing().unwrap();
        assert!(s.is_fully_initialized());
        assert_eq!(s.vm(vm).unwrap().task_count(), 4);
    }

    #[test]
    fn test_kill_all_tasks() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        for n in 1..=3 {
            s.adopt_task(sim(n, &record, vec![])).unwrap();
        }
        s.kill_all_tasks();
        assert_eq!(s.task_count(), 0);
        assert_eq!(s.vm_count(), 0);

        let record = record.borrow();
        for n in 1..=3 {
            let events = record.events_for_task(tid(n));
            assert_eq!(
                events,
                vec![
                    &SimEvent::Killed { tid: tid(n) },
                    &SimEvent::Detached { tid: tid(n) },
                    &SimEvent::Dropped { tid: tid(n) },
                ]
            );
        }
    }

    #[test]
    fn test_teardown_clean() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![])).unwrap();
        drop(s.open_emulated_file(tid(1), FileKey::new(1, 1), "/a", 1).unwrap());
        s.teardown().unwrap();
        assert!(diagnostics.is_empty());
        assert!(record.borrow().was_dropped(tid(1)));
    }

    #[test]
    fn test_teardown_reports_leaked_file() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![])).unwrap();
        let held = s.open_emulated_file(tid(1), FileKey::new(1, 1), "/a", 1).unwrap();

        let err = s.teardown().unwrap_err();
        assert_eq!(
            err,
            DiversionError::Contract(ContractViolation::LeakedEmulatedFiles { count: 1 })
        );
        assert_eq!(diagnostics.violations().len(), 1);
        drop(held);
    }

    #[test]
    fn test_drop_tears_down_once() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let held;
        {
            let mut s = session(&diagnostics);
            s.adopt_task(sim(1, &record, vec![])).unwrap();
            held = s.open_emulated_file(tid(1), FileKey::new(1, 1), "/a", 1).unwrap();
        }
        assert!(record.borrow().was_dropped(tid(1)));
        assert_eq!(
            diagnostics.violations(),
            vec![ContractViolation::LeakedEmulatedFiles { count: 1 }]
        );
        drop(held);
    }

    #[test]
    fn test_open_emulated_file_unknown_task() {
        let diagnostics = CapturingDiagnostics::new();
        let mut s = session(&diagnostics);
        let err = s
            .open_emulated_file(tid(9), FileKey::new(1, 1), "/a", 1)
            .unwrap_err();
        assert_eq!(err, DiversionError::TaskNotFound(tid(9)));
    }

    #[test]
    fn test_breakpoint_via_diagnoser_mut() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.diagnoser_mut()
            .add_breakpoint(detour_core::RemotePtr::new(0x40_1000));
        s.adopt_task(sim(
            1,
            &record,
            vec![SimStop::signal_at(SigInfo::new(Signal::SIGTRAP, 128), 0x40_1001)],
        ))
        .unwrap();
        s.finish_initializing().unwrap();
        let result = s.diversion_step(tid(1), RunCommand::Continue, None).unwrap();
        assert!(result.break_status.breakpoint_hit);
    }

    #[test]
    fn test_singlestep_uses_sysemu_singlestep() {
        let diagnostics = CapturingDiagnostics::new();
        let record = SimRecord::shared();
        let mut s = session(&diagnostics);
        s.adopt_task(sim(1, &record, vec![SimStop::signal(SigInfo::new(Signal::SIGTRAP, 2))]))
            .unwrap();
        s.finish_initializing().unwrap();
        let result = s.diversion_step(tid(1), RunCommand::SingleStep, None).unwrap();
        assert!(result.break_status.singlestep_complete);
        assert_eq!(
            record.borrow().resumes(),
            vec![(tid(1), ResumeHow::SysemuSinglestep)]
        );
    }

    const SIGNAL_SENDERS: [&str; 6] = [
        "ipc",
        "kill",
        "rt_sigqueueinfo",
        "rt_tgsigqueueinfo",
        "tgkill",
        "tkill",
    ];

    proptest! {
        #[test]
        fn prop_random_diversions_never_leak(seed in any::<u64>(), len in 1usize..40) {
            use detour_sim::{ScriptGenerator, SimSeed};

            let diagnostics = CapturingDiagnostics::new();
            let record = SimRecord::shared();
            let mut s = session(&diagnostics);
            let script = ScriptGenerator::new(Arch::X86_64, &SimSeed::from_literal(seed)).script(len);
            s.adopt_task(sim(1, &record, script)).unwrap();
            s.finish_initializing().unwrap();

            let mut steps = 0;
            loop {
                let result = s.diversion_step(tid(1), RunCommand::Continue, None).unwrap();
                steps += 1;
                if result.is_exited() {
                    break;
                }
            }
            prop_assert_eq!(steps, len + 1);
            prop_assert_eq!(s.task_count(), 0);
            s.teardown().unwrap();
            prop_assert!(diagnostics.is_empty());

            for (_, syscallno) in record.borrow().injected_syscalls() {
                let name = detour_core::syscall_name(syscallno, Arch::X86_64).name();
                prop_assert!(!name.is_some_and(|n| SIGNAL_SENDERS.contains(&n)));
            }
        }
    }
}
