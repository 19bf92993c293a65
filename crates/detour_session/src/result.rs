//! Step commands and step results.

use detour_core::{RemotePtr, SigInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a diversion step runs the tracee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCommand {
    /// Run until the next stop
    Continue,
    /// Execute one instruction
    SingleStep,
    /// Single-step, skipping repeated string instructions. Not accepted by
    /// diversions.
    SingleStepFastForward,
}

impl fmt::Display for RunCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::SingleStep => write!(f, "singlestep"),
            Self::SingleStepFastForward => write!(f, "singlestep-fast-forward"),
        }
    }
}

/// Why the tracee stopped, from the debugger's point of view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakStatus {
    /// A software breakpoint was hit
    pub breakpoint_hit: bool,
    /// Watched addresses whose value changed
    pub watchpoints_hit: Vec<RemotePtr>,
    /// A requested single-step completed
    pub singlestep_complete: bool,
    /// Signal the debugger should see, when the stop is not a debugger trap
    pub signal: Option<SigInfo>,
    /// The task exited
    pub task_exit: bool,
}

impl BreakStatus {
    /// Whether the debugger should regain control
    #[must_use]
    pub fn any_break(&self) -> bool {
        self.breakpoint_hit
            || !self.watchpoints_hit.is_empty()
            || self.singlestep_complete
            || self.signal.is_some()
    }
}

/// Whether the diverted task survived the step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversionStatus {
    /// Task may be stepped again
    Continuing,
    /// Task exited and has been removed from the session
    Exited,
}

/// Outcome of one diversion step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversionResult {
    /// Task status
    pub status: DiversionStatus,
    /// Debugger-visible stop reason
    pub break_status: BreakStatus,
}

impl DiversionResult {
    /// Continuing with no break
    #[must_use]
    pub fn continuing() -> Self {
        Self {
            status: DiversionStatus::Continuing,
            break_status: BreakStatus::default(),
        }
    }

    /// Exited
    #[must_use]
    pub fn exited() -> Self {
        Self {
            status: DiversionStatus::Exited,
            break_status: BreakStatus {
                task_exit: true,
                ..BreakStatus::default()
            },
        }
    }

    /// Set the break status
    #[must_use]
    pub fn with_break_status(mut self, break_status: BreakStatus) -> Self {
        self.break_status = break_status;
        self
    }

    /// Whether the task exited
    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.status == DiversionStatus::Exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::Signal;

    #[test]
    fn test_any_break() {
        assert!(!BreakStatus::default().any_break());
        let status = BreakStatus {
            watchpoints_hit: vec![RemotePtr::new(0x10)],
            ..BreakStatus::default()
        };
        assert!(status.any_break());
        let status = BreakStatus {
            signal: Some(SigInfo::new(Signal::SIGSEGV, 1)),
            ..BreakStatus::default()
        };
        assert!(status.any_break());
    }

    #[test]
    fn test_exit_is_not_a_break() {
        let result = DiversionResult::exited();
        assert!(result.is_exited());
        assert!(result.break_status.task_exit);
        assert!(!result.break_status.any_break());
    }

    #[test]
    fn test_run_command_names() {
        assert_eq!(RunCommand::SingleStep.to_string(), "singlestep");
        let cmd: RunCommand = serde_json::from_str(r#""single_step_fast_forward""#).unwrap();
        assert_eq!(cmd, RunCommand::SingleStepFastForward);
    }
}
