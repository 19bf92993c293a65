//! ptrace events reported with a tracee stop.

use serde::{Deserialize, Serialize};

/// The `PTRACE_EVENT_*` a stop was reported with, if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtraceEvent {
    /// Plain stop with no event attached
    #[default]
    None,
    /// `PTRACE_EVENT_FORK`
    Fork,
    /// `PTRACE_EVENT_VFORK`
    Vfork,
    /// `PTRACE_EVENT_CLONE`
    Clone,
    /// `PTRACE_EVENT_EXEC`
    Exec,
    /// `PTRACE_EVENT_VFORK_DONE`
    VforkDone,
    /// `PTRACE_EVENT_EXIT`: the tracee is about to exit and has no usable
    /// register state
    Exit,
    /// `PTRACE_EVENT_SECCOMP`
    Seccomp,
    /// `PTRACE_EVENT_STOP`
    Stop,
}

impl PtraceEvent {
    /// Decode the event number from the high byte of a wait status
    #[must_use]
    pub const fn from_raw(event: i32) -> Option<Self> {
        match event {
            0 => Some(Self::None),
            1 => Some(Self::Fork),
            2 => Some(Self::Vfork),
            3 => Some(Self::Clone),
            4 => Some(Self::Exec),
            5 => Some(Self::VforkDone),
            6 => Some(Self::Exit),
            7 => Some(Self::Seccomp),
            128 => Some(Self::Stop),
            _ => None,
        }
    }

    /// Whether the tracee is on its way out
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(PtraceEvent::from_raw(6), Some(PtraceEvent::Exit));
        assert_eq!(PtraceEvent::from_raw(128), Some(PtraceEvent::Stop));
        assert_eq!(PtraceEvent::from_raw(42), None);
    }

    #[test]
    fn test_only_exit_is_exit() {
        assert!(PtraceEvent::Exit.is_exit());
        assert!(!PtraceEvent::None.is_exit());
        assert!(!PtraceEvent::Exec.is_exit());
    }
}
