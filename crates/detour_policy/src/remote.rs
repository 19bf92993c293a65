//! Scoped remote syscall injection.

use detour_core::{
    syscall_name, CoreError, CoreResult, Registers, RemoteInjector, Task, SYSCALL_ARG_COUNT,
};
use tracing::debug;

/// Holds a tracee in remote-call mode for as long as it lives.
///
/// Construction saves the tracee's state and prepares it for injection.
/// Dropping the guard restores that state with [`regs`](Self::regs) installed
/// as the register set, on every exit path including unwinding.
pub struct AutoRemoteSyscalls<'t, T: Task + RemoteInjector + ?Sized> {
    task: &'t mut T,
    site: Option<T::Site>,
    regs: Registers,
}

impl<'t, T: Task + RemoteInjector + ?Sized> AutoRemoteSyscalls<'t, T> {
    /// Enter remote-call mode on `task`
    ///
    /// # Errors
    ///
    /// Returns error if the injector cannot prepare the tracee
    pub fn new(task: &'t mut T) -> CoreResult<Self> {
        let site = task.begin_remote_call()?;
        let regs = task.regs().clone();
        Ok(Self {
            task,
            site: Some(site),
            regs,
        })
    }

    /// Registers that will be installed when the guard is released
    #[must_use]
    pub fn regs(&self) -> &Registers {
        &self.regs
    }

    /// Mutable access to the registers installed on release
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Issue `syscallno(args...)` in the tracee and return the raw result,
    /// which may be an `-errno` value
    ///
    /// # Errors
    ///
    /// Returns error if the injector could not run the syscall
    pub fn syscall(&mut self, syscallno: i64, args: [u64; SYSCALL_ARG_COUNT]) -> CoreResult<i64> {
        let site = self.site.as_ref().ok_or_else(|| CoreError::Internal {
            message: "remote call site already released".to_string(),
        })?;
        let ret = self.task.inject_syscall(site, syscallno, args)?;
        debug!(
            tid = %self.task.tid(),
            syscall = %syscall_name(syscallno, self.task.arch()),
            ret,
            "remote syscall"
        );
        Ok(ret)
    }
}

impl<T: Task + RemoteInjector + ?Sized> Drop for AutoRemoteSyscalls<'_, T> {
    fn drop(&mut self) {
        if let Some(site) = self.site.take() {
            self.task.end_remote_call(site, &self.regs);
        }
    }
}
