//! Stops a simulated tracee reports when resumed.

use detour_core::{syscall_number, Arch, CoreError, CoreResult, SigInfo};
use serde::{Deserialize, Serialize};

/// A syscall given by number or by name in the tracee's architecture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyscallRef {
    /// Raw number
    Number(i64),
    /// Name resolved through the architecture's table
    Name(String),
}

impl SyscallRef {
    /// Resolve to a raw number for `arch`
    ///
    /// # Errors
    ///
    /// Returns error if the name is not in `arch`'s table
    pub fn resolve(&self, arch: Arch) -> CoreResult<i64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Name(name) => syscall_number(name, arch).ok_or_else(|| CoreError::NotFound {
                kind: format!("{} syscall", arch),
                id: name.clone(),
            }),
        }
    }
}

impl From<i64> for SyscallRef {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for SyscallRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// The next stop a simulated tracee reaches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stop", rename_all = "snake_case")]
pub enum SimStop {
    /// The tracee entered a syscall
    SyscallEntry {
        /// Syscall
        syscall: SyscallRef,
        /// Argument registers
        #[serde(default)]
        args: [u64; 6],
        /// Whether this is the preload library's desched ioctl
        #[serde(default)]
        desched: bool,
        /// Instruction pointer at the stop, if it moves
        #[serde(default)]
        ip: Option<u64>,
    },
    /// The tracee was stopped by a signal
    Signal {
        /// siginfo of the stop signal
        siginfo: SigInfo,
        /// Instruction pointer at the stop, if it moves
        #[serde(default)]
        ip: Option<u64>,
    },
    /// The tracee is exiting (`PTRACE_EVENT_EXIT`)
    Exit,
}

impl SimStop {
    /// Syscall-entry stop with the given arguments
    #[must_use]
    pub fn syscall(syscall: impl Into<SyscallRef>, args: [u64; 6]) -> Self {
        Self::SyscallEntry {
            syscall: syscall.into(),
            args,
            desched: false,
            ip: None,
        }
    }

    /// The preload library's arm/disarm desched ioctl
    #[must_use]
    pub fn desched_ioctl(args: [u64; 6]) -> Self {
        Self::SyscallEntry {
            syscall: SyscallRef::from("ioctl"),
            args,
            desched: true,
            ip: None,
        }
    }

    /// Signal stop
    #[must_use]
    pub fn signal(siginfo: SigInfo) -> Self {
        Self::Signal { siginfo, ip: None }
    }

    /// Signal stop with the instruction pointer moved to `ip`
    #[must_use]
    pub fn signal_at(siginfo: SigInfo, ip: u64) -> Self {
        Self::Signal {
            siginfo,
            ip: Some(ip),
        }
    }
}
