//! Tracee register snapshot.
//!
//! Only the registers the diversion engine reads or writes are modelled:
//! instruction and stack pointers, the original syscall number, the six
//! syscall argument registers, and the syscall result register. Mapping these
//! onto a concrete `user_regs_struct` is the accessor layer's job.

use crate::arch::Arch;
use crate::remote_ptr::RemotePtr;
use serde::{Deserialize, Serialize};

/// Number of syscall argument registers on every supported architecture
pub const SYSCALL_ARG_COUNT: usize = 6;

/// Register state of a stopped tracee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    arch: Arch,
    ip: u64,
    sp: u64,
    original_syscallno: i64,
    args: [u64; SYSCALL_ARG_COUNT],
    syscall_result: u64,
}

impl Registers {
    /// Zeroed registers for `arch`
    #[must_use]
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            ip: 0,
            sp: 0,
            original_syscallno: -1,
            args: [0; SYSCALL_ARG_COUNT],
            syscall_result: 0,
        }
    }

    /// Registers as they look at entry to `syscallno(args...)`
    #[must_use]
    pub fn at_syscall_entry(arch: Arch, syscallno: i64, args: [u64; SYSCALL_ARG_COUNT]) -> Self {
        Self {
            original_syscallno: syscallno,
            args,
            ..Self::new(arch)
        }
    }

    /// Set instruction pointer
    #[must_use]
    pub fn with_ip(mut self, ip: u64) -> Self {
        self.ip = ip;
        self
    }

    /// Set stack pointer
    #[must_use]
    pub fn with_sp(mut self, sp: u64) -> Self {
        self.sp = sp;
        self
    }

    /// Architecture these registers belong to
    #[must_use]
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Instruction pointer
    #[must_use]
    pub fn ip(&self) -> RemotePtr {
        RemotePtr::new(self.ip)
    }

    /// Set instruction pointer
    pub fn set_ip(&mut self, ip: RemotePtr) {
        self.ip = ip.as_u64();
    }

    /// Stack pointer
    #[must_use]
    pub fn sp(&self) -> RemotePtr {
        RemotePtr::new(self.sp)
    }

    /// Set stack pointer
    pub fn set_sp(&mut self, sp: RemotePtr) {
        self.sp = sp.as_u64();
    }

    /// Syscall number as it was at syscall entry
    #[must_use]
    pub fn original_syscallno(&self) -> i64 {
        self.original_syscallno
    }

    /// Set the original syscall number
    pub fn set_original_syscallno(&mut self, syscallno: i64) {
        self.original_syscallno = syscallno;
    }

    /// Syscall argument `index` counted from 1, as the ABI documents do
    ///
    /// # Panics
    ///
    /// Panics if `index` is not in `1..=6`
    #[must_use]
    pub fn arg(&self, index: usize) -> u64 {
        assert!((1..=SYSCALL_ARG_COUNT).contains(&index), "no syscall arg {}", index);
        self.args[index - 1]
    }

    /// All six syscall arguments
    #[must_use]
    pub fn args(&self) -> [u64; SYSCALL_ARG_COUNT] {
        self.args
    }

    /// Set argument `index` counted from 1
    ///
    /// # Panics
    ///
    /// Panics if `index` is not in `1..=6`
    pub fn set_arg(&mut self, index: usize, value: u64) {
        assert!((1..=SYSCALL_ARG_COUNT).contains(&index), "no syscall arg {}", index);
        self.args[index - 1] = value;
    }

    /// Raw syscall result register
    #[must_use]
    pub fn syscall_result(&self) -> u64 {
        self.syscall_result
    }

    /// Syscall result sign-extended, so `-errno` values read as negative
    #[must_use]
    pub fn syscall_result_signed(&self) -> i64 {
        match self.arch.word_size() {
            4 => i64::from(self.syscall_result as u32 as i32),
            _ => self.syscall_result as i64,
        }
    }

    /// Set the syscall result register
    pub fn set_syscall_result(&mut self, result: i64) {
        self.syscall_result = match self.arch.word_size() {
            4 => u64::from(result as u32),
            _ => result as u64,
        };
    }

    /// Whether the result register holds an `-errno` value
    #[must_use]
    pub fn syscall_failed(&self) -> bool {
        (-4096..0).contains(&self.syscall_result_signed())
    }
}
