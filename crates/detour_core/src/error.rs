//! Core error types for DETOUR.

use crate::id::TaskId;
use crate::remote_ptr::RemotePtr;
use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Tracee memory could not be read or written
    MemoryFault {
        /// Task whose memory was accessed
        tid: TaskId,
        /// Faulting address
        addr: RemotePtr,
    },

    /// The tracee died while being operated on
    TaskDied {
        /// Task that died
        tid: TaskId,
    },

    /// Task is not parked at a stop where the operation is legal
    InvalidStop {
        /// Task in question
        tid: TaskId,
        /// What the caller needed
        expected: String,
    },

    /// Remote syscall injection failed
    InjectionFailed {
        /// Task the syscall was injected into
        tid: TaskId,
        /// Failure description
        reason: String,
    },

    /// Invalid argument
    InvalidArgument {
        /// Argument name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Not found
    NotFound {
        /// What was looked up
        kind: String,
        /// Identifier that was not found
        id: String,
    },

    /// Already exists
    AlreadyExists {
        /// What was inserted
        kind: String,
        /// Identifier already present
        id: String,
    },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryFault { tid, addr } => {
                write!(f, "Memory fault in task {} at {}", tid, addr)
            }
            Self::TaskDied { tid } => write!(f, "Task {} died", tid),
            Self::InvalidStop { tid, expected } => {
                write!(f, "Task {} is not at {}", tid, expected)
            }
            Self::InjectionFailed { tid, reason } => {
                write!(f, "Remote syscall in task {} failed: {}", tid, reason)
            }
            Self::InvalidArgument { name, reason } => {
                write!(f, "Invalid argument {}: {}", name, reason)
            }
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            Self::AlreadyExists { kind, id } => write!(f, "{} already exists: {}", kind, id),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}
