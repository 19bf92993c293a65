//! Identifiers for traced entities.
//!
//! Task ids are the kernel thread ids of live tracees. Address spaces have no
//! kernel-visible id, so they are named by a serial allocated by the session.

use serde::{Deserialize, Serialize};

/// Task identifier - the real tid of a traced thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i32);

impl TaskId {
    /// Create from a raw tid
    #[must_use]
    pub const fn new(tid: i32) -> Self {
        Self(tid)
    }

    /// Get the raw tid
    #[must_use]
    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address space identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmId {
    /// tid of the task that created the address space
    pub leader: TaskId,
    /// Exec count of that task, distinguishing address spaces across execve
    pub serial: u32,
}

impl VmId {
    /// Create a new address space id
    #[must_use]
    pub const fn new(leader: TaskId, serial: u32) -> Self {
        Self { leader, serial }
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm_{}_{}", self.leader, self.serial)
    }
}
