//! Session errors and contract violations.

use crate::result::RunCommand;
use detour_core::{Arch, CoreError, TaskId};
use thiserror::Error;

/// Session result type
pub type SessionResult<T> = Result<T, DiversionError>;

/// A caller or collaborator broke the engine's contract.
///
/// Violations are reported through [`Diagnostics`](crate::Diagnostics)
/// before they are returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// The run command is not one a diversion accepts
    #[error("Illegal run command {command} for task {tid}")]
    IllegalRunCommand {
        /// Task the step was for
        tid: TaskId,
        /// Rejected command
        command: RunCommand,
    },

    /// The diagnoser reported single-step completion for a step that was
    /// not a single-step
    #[error("Task {tid} reported singlestep complete under {command}")]
    SinglestepWithoutSinglestepCommand {
        /// Task in question
        tid: TaskId,
        /// Command the step ran with
        command: RunCommand,
    },

    /// A step was requested before the session finished initializing
    #[error("Session not fully initialized when stepping task {tid}")]
    NotFullyInitialized {
        /// Task the step was for
        tid: TaskId,
    },

    /// Tasks remained after the session killed them all
    #[error("{count} tasks leaked at session teardown")]
    LeakedTasks {
        /// How many
        count: usize,
    },

    /// Address spaces remained after the session killed every task
    #[error("{count} address spaces leaked at session teardown")]
    LeakedAddressSpaces {
        /// How many
        count: usize,
    },

    /// Emulated files were still referenced at teardown
    #[error("{count} emulated files leaked at session teardown")]
    LeakedEmulatedFiles {
        /// How many
        count: usize,
    },

    /// The task's register set is for a different architecture than the one
    /// the task is dispatched under
    #[error("Task {tid} runs {arch} but has {regs_arch} registers")]
    UnsupportedArch {
        /// Task in question
        tid: TaskId,
        /// Architecture the task reports
        arch: Arch,
        /// Architecture of its register snapshot
        regs_arch: Arch,
    },
}

/// Diversion session error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiversionError {
    /// Operation on a tracee failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Contract violation
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// No task with this tid is in the session
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
}
