//! Scripted stand-in for the live kernel that injected syscalls reach.

use detour_core::{syscall_number, Arch, TaskId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Returns canned results for syscalls injected into a simulated tracee.
///
/// Unscripted syscalls behave like a kernel that succeeds quietly: `write`
/// reports the whole buffer written, `getpid` and `gettid` return the
/// caller's tid, anything else returns 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimKernel {
    /// Scripted results by syscall number, consumed per call when a list
    #[serde(default)]
    results: IndexMap<i64, KernelResult>,
}

/// Scripted outcome for one syscall number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KernelResult {
    /// Same value every call
    Always(i64),
    /// One value per call, in order; the last one repeats
    Sequence(Vec<i64>),
}

impl SimKernel {
    /// Kernel with no scripted results
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `ret` for `syscallno`
    #[must_use]
    pub fn with_result(mut self, syscallno: i64, ret: i64) -> Self {
        self.results.insert(syscallno, KernelResult::Always(ret));
        self
    }

    /// Return `rets` in order for successive calls of `syscallno`
    #[must_use]
    pub fn with_sequence(mut self, syscallno: i64, rets: Vec<i64>) -> Self {
        self.results.insert(syscallno, KernelResult::Sequence(rets));
        self
    }

    /// Run `syscallno` on behalf of `tid`
    pub fn execute(&mut self, arch: Arch, tid: TaskId, syscallno: i64, args: [u64; 6]) -> i64 {
        match self.results.get_mut(&syscallno) {
            Some(KernelResult::Always(ret)) => return *ret,
            Some(KernelResult::Sequence(rets)) if !rets.is_empty() => {
                return if rets.len() > 1 { rets.remove(0) } else { rets[0] };
            }
            _ => {}
        }
        if Some(syscallno) == syscall_number("write", arch) {
            return args[2] as i64;
        }
        if Some(syscallno) == syscall_number("getpid", arch)
            || Some(syscallno) == syscall_number("gettid", arch)
        {
            return i64::from(tid.as_raw());
        }
        0
    }
}
