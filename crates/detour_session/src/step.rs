//! One diversion step of one task.

use crate::config::DiversionConfig;
use crate::diagnose::TrapDiagnoser;
use crate::diagnostics::Diagnostics;
use crate::error::{ContractViolation, DiversionError, SessionResult};
use crate::result::{DiversionResult, RunCommand};
use detour_core::{preload_globals, ResumeHow, ResumeRequest, Signal, TaskId, Tracee};
use detour_policy::SyscallPolicy;
use tracing::{debug, warn};

/// What a step needs besides the task
pub(crate) struct Stepper<'s, D> {
    pub(crate) config: &'s DiversionConfig,
    pub(crate) policy: &'s SyscallPolicy,
    pub(crate) diagnoser: &'s mut D,
    pub(crate) diagnostics: &'s dyn Diagnostics,
}

/// Reject commands a diversion cannot run, before the task is touched
pub(crate) fn check_command(tid: TaskId, command: RunCommand) -> Result<(), ContractViolation> {
    match command {
        RunCommand::Continue | RunCommand::SingleStep => Ok(()),
        RunCommand::SingleStepFastForward => {
            Err(ContractViolation::IllegalRunCommand { tid, command })
        }
    }
}

impl<D> Stepper<'_, D> {
    /// Report `violation` and turn it into an error
    pub(crate) fn violation(&self, violation: ContractViolation) -> DiversionError {
        self.diagnostics.report(&violation);
        DiversionError::Contract(violation)
    }

    /// Run `task` for one step.
    ///
    /// On [`Exited`](crate::DiversionStatus::Exited) the task has been
    /// marked killed and detached; the caller must drop it.
    pub(crate) fn step<T>(
        &mut self,
        task: &mut T,
        command: RunCommand,
        signal_to_deliver: Option<Signal>,
    ) -> SessionResult<DiversionResult>
    where
        T: Tracee + ?Sized,
        D: TrapDiagnoser<T>,
    {
        check_command(task.tid(), command).map_err(|v| self.violation(v))?;

        if task.ptrace_event().is_exit() {
            finalize_exit(task);
            return Ok(DiversionResult::exited());
        }

        if let Some(globals) = task.preload_globals() {
            task.write_u8(globals.field(preload_globals::IN_DIVERSION), 1)?;
        }
        // Syscalls must reach ptrace so the policy sees them
        task.set_syscallbuf_locked(true);

        let how = match command {
            RunCommand::SingleStep => ResumeHow::SysemuSinglestep,
            _ => ResumeHow::Sysemu,
        };
        debug!(?how, sig = ?signal_to_deliver, "resuming");
        task.resume_execution(
            ResumeRequest::new(how)
                .with_ticks(self.config.tick_budget)
                .with_signal(signal_to_deliver),
        )?;

        if task.ptrace_event().is_exit() {
            finalize_exit(task);
            return Ok(DiversionResult::exited());
        }

        if let Some(sig) = task.stop_sig() {
            match task.siginfo() {
                Some(siginfo) => debug!(%siginfo, "stopped by signal"),
                None => debug!(%sig, "stopped by signal"),
            }
            let break_status = self.diagnoser.diagnose_debugger_trap(task, command);
            debug!(
                breakpoint = break_status.breakpoint_hit,
                watchpoints = break_status.watchpoints_hit.len(),
                singlestep = break_status.singlestep_complete,
                "break status"
            );
            if break_status.singlestep_complete && command != RunCommand::SingleStep {
                return Err(self.violation(ContractViolation::SinglestepWithoutSinglestepCommand {
                    tid: task.tid(),
                    command,
                }));
            }
            return Ok(DiversionResult::continuing().with_break_status(break_status));
        }

        let regs_arch = task.regs().arch();
        if regs_arch != task.arch() {
            return Err(self.violation(ContractViolation::UnsupportedArch {
                tid: task.tid(),
                arch: task.arch(),
                regs_arch,
            }));
        }
        let syscallno = task.regs().original_syscallno();
        let decision = self.policy.process_syscall(task, syscallno)?;
        debug!(
            syscall = %decision.syscall,
            disposition = %decision.disposition,
            result = ?decision.result,
            "syscall processed"
        );

        let mut result = DiversionResult::continuing();
        self.diagnoser
            .check_for_watchpoint_changes(task, &mut result.break_status);
        Ok(result)
    }
}

fn finalize_exit<T: Tracee + ?Sized>(task: &mut T) {
    debug!("task exited");
    task.did_kill();
    if let Err(err) = task.detach() {
        warn!(%err, "detach after exit failed");
    }
}
