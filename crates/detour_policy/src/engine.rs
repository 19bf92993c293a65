//! Carrying out the disposition of a syscall-entry stop.

use crate::classify::{classify, Disposition};
use crate::remote::AutoRemoteSyscalls;
use detour_core::syscalls::{Aarch64, X86, X86_64};
use detour_core::{
    syscall_name, Arch, ArchSyscalls, CoreError, CoreResult, SyscallId, TaskId, Tracee,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a suppressed syscall appears to return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressedResult {
    /// Leave the result register as the tracee had it at syscall entry
    #[default]
    Untouched,
    /// Write this value, e.g. `-38` (`-ENOSYS`)
    Sentinel(i64),
}

/// Policy engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Result seen by the tracee for suppressed syscalls
    #[serde(default)]
    pub suppressed_result: SuppressedResult,
}

impl PolicyConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the suppressed-syscall result
    #[must_use]
    pub fn with_suppressed_result(mut self, result: SuppressedResult) -> Self {
        self.suppressed_result = result;
        self
    }
}

/// Record of one policy decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    /// Task the syscall was made by
    pub tid: TaskId,
    /// Architecture the number was interpreted under
    pub arch: Arch,
    /// Raw syscall number
    pub syscallno: i64,
    /// Symbolic identity
    pub syscall: SyscallId,
    /// What was done
    pub disposition: Disposition,
    /// Result written to the tracee's result register, if any
    pub result: Option<i64>,
}

/// Applies the diversion syscall policy to tasks stopped at syscall entry
#[derive(Debug, Clone, Default)]
pub struct SyscallPolicy {
    config: PolicyConfig,
}

impl SyscallPolicy {
    /// Create a policy engine with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: PolicyConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Dispose of the syscall `task` is entering
    ///
    /// # Errors
    ///
    /// Returns error if the task is not at a syscall-entry stop, or if
    /// finishing or reissuing the syscall fails
    pub fn process_syscall<T: Tracee + ?Sized>(
        &self,
        task: &mut T,
        syscallno: i64,
    ) -> CoreResult<PolicyDecision> {
        if let Some(sig) = task.stop_sig() {
            return Err(CoreError::InvalidStop {
                tid: task.tid(),
                expected: format!("a syscall-entry stop (stopped by {})", sig),
            });
        }
        match task.arch() {
            Arch::X86 => self.process_syscall_arch::<X86, T>(task, syscallno),
            Arch::X86_64 => self.process_syscall_arch::<X86_64, T>(task, syscallno),
            Arch::Aarch64 => self.process_syscall_arch::<Aarch64, T>(task, syscallno),
        }
    }

    fn process_syscall_arch<A: ArchSyscalls, T: Tracee + ?Sized>(
        &self,
        task: &mut T,
        syscallno: i64,
    ) -> CoreResult<PolicyDecision> {
        let syscall = syscall_name(syscallno, A::ARCH);
        debug!(tid = %task.tid(), %syscall, "Processing syscall");

        let disposition = classify::<A>(syscallno, task.is_desched_event_syscall());
        let result = match disposition {
            Disposition::DeschedNoop => {
                // The preload library aborts if arming or disarming the
                // desched event fails, so it must see success.
                finish_emulated_syscall_with_ret(task, 0)?;
                Some(0)
            }
            Disposition::Suppress => {
                debug!(tid = %task.tid(), %syscall, "Suppressing syscall");
                match self.config.suppressed_result {
                    SuppressedResult::Untouched => {
                        task.finish_emulated_syscall()?;
                        None
                    }
                    SuppressedResult::Sentinel(ret) => {
                        finish_emulated_syscall_with_ret(task, ret)?;
                        Some(ret)
                    }
                }
            }
            Disposition::Execute => {
                debug!(tid = %task.tid(), %syscall, "Executing syscall");
                Some(execute_syscall(task)?)
            }
        };

        Ok(PolicyDecision {
            tid: task.tid(),
            arch: A::ARCH,
            syscallno,
            syscall,
            disposition,
            result,
        })
    }
}

fn finish_emulated_syscall_with_ret<T: Tracee + ?Sized>(task: &mut T, ret: i64) -> CoreResult<()> {
    task.finish_emulated_syscall()?;
    let mut regs = task.regs().clone();
    regs.set_syscall_result(ret);
    task.set_regs(regs);
    Ok(())
}

/// Reissue the syscall in `task`'s registers against the live kernel and hand
/// its result back to the tracee.
///
/// Emulated fds from the replay may collide with real fds in the tracee's
/// table, so writes can land somewhere other than the tracee expects. Only
/// the stdio fds leak into tracees in practice.
fn execute_syscall<T: Tracee + ?Sized>(task: &mut T) -> CoreResult<i64> {
    task.finish_emulated_syscall()?;

    let mut remote = AutoRemoteSyscalls::new(task)?;
    let syscallno = remote.regs().original_syscallno();
    let args = remote.regs().args();
    let ret = remote.syscall(syscallno, args)?;
    remote.regs_mut().set_syscall_result(ret);
    Ok(ret)
}
