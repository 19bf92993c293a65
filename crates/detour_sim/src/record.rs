//! Recording of what simulated tracees were asked to do.
//!
//! Tasks are dropped by the session when they exit, so tests observe them
//! through a [`SharedRecord`] the tasks append to instead of through the
//! task objects themselves.

use detour_core::{RemotePtr, ResumeHow, Signal, TaskId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Something a simulated tracee observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    /// Tracee was resumed
    Resumed {
        /// Task
        tid: TaskId,
        /// ptrace request
        how: ResumeHow,
        /// Signal delivered on resume
        sig: Option<Signal>,
    },
    /// A byte of tracee memory was written
    WroteMemory {
        /// Task
        tid: TaskId,
        /// Address
        addr: RemotePtr,
        /// Value
        value: u8,
    },
    /// The emulated syscall entry was closed out
    FinishedEmulatedSyscall {
        /// Task
        tid: TaskId,
    },
    /// A syscall reached the simulated live kernel
    Injected {
        /// Task
        tid: TaskId,
        /// Number
        syscallno: i64,
        /// Arguments
        args: [u64; 6],
        /// What the kernel returned
        ret: i64,
    },
    /// Tracee was killed
    Killed {
        /// Task
        tid: TaskId,
    },
    /// Tracee was detached
    Detached {
        /// Task
        tid: TaskId,
    },
    /// The task object was dropped
    Dropped {
        /// Task
        tid: TaskId,
    },
}

impl SimEvent {
    /// Task the event belongs to
    #[must_use]
    pub fn tid(&self) -> TaskId {
        match self {
            Self::Resumed { tid, .. }
            | Self::WroteMemory { tid, .. }
            | Self::FinishedEmulatedSyscall { tid }
            | Self::Injected { tid, .. }
            | Self::Killed { tid }
            | Self::Detached { tid }
            | Self::Dropped { tid } => *tid,
        }
    }
}

/// Ordered log of simulation events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRecord {
    /// Events in the order they happened
    pub events: Vec<SimEvent>,
}

/// Record handle shared between the test and the tasks it hands to a session
pub type SharedRecord = Rc<RefCell<SimRecord>>;

impl SimRecord {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record behind a shareable handle
    #[must_use]
    pub fn shared() -> SharedRecord {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Append an event
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Get event count
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Events for a specific task
    #[must_use]
    pub fn events_for_task(&self, tid: TaskId) -> Vec<&SimEvent> {
        self.events.iter().filter(|e| e.tid() == tid).collect()
    }

    /// Syscalls that reached the live kernel, as `(tid, syscallno)`
    #[must_use]
    pub fn injected_syscalls(&self) -> Vec<(TaskId, i64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Injected { tid, syscallno, .. } => Some((*tid, *syscallno)),
                _ => None,
            })
            .collect()
    }

    /// Resume requests issued, as `(tid, how)`
    #[must_use]
    pub fn resumes(&self) -> Vec<(TaskId, ResumeHow)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Resumed { tid, how, .. } => Some((*tid, *how)),
                _ => None,
            })
            .collect()
    }

    /// Whether the task object for `tid` has been dropped
    #[must_use]
    pub fn was_dropped(&self, tid: TaskId) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, SimEvent::Dropped { tid: t } if *t == tid))
    }
}

/// Comparison of two simulation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunComparison {
    /// Whether runs are identical
    pub identical: bool,
    /// Index of the first differing event
    pub first_divergence: Option<usize>,
}

impl RunComparison {
    /// Compare two simulation records
    #[must_use]
    pub fn compare(record1: &SimRecord, record2: &SimRecord) -> Self {
        let first_divergence = record1
            .events
            .iter()
            .zip(record2.events.iter())
            .position(|(a, b)| a != b)
            .or_else(|| {
                (record1.events.len() != record2.events.len())
                    .then(|| record1.events.len().min(record2.events.len()))
            });
        Self {
            identical: first_divergence.is_none(),
            first_divergence,
        }
    }

    /// Get formatted report
    #[must_use]
    pub fn report(&self) -> String {
        match self.first_divergence {
            None => "Runs are identical".to_string(),
            Some(index) => format!("Runs diverge at event {}", index),
        }
    }
}
