//! Scenario files: a set of simulated tracees and the steps to drive them.

use crate::generate::ScriptGenerator;
use crate::kernel::SimKernel;
use crate::record::SharedRecord;
use crate::seed::SimSeed;
use crate::stop::SimStop;
use crate::task::SimTask;
use detour_core::{Arch, CoreError, Registers, RemotePtr, Signal, TaskId, VmId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Scenario loading errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file is not valid scenario JSON
    #[error("Invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
    /// A task's script or registers could not be built
    #[error("Task {tid}: {source}")]
    Task {
        /// Task in question
        tid: TaskId,
        /// Underlying error
        source: CoreError,
    },
    /// Two tasks share a tid
    #[error("Duplicate task {0}")]
    DuplicateTask(TaskId),
    /// A task's address-space leader is not declared
    #[error("Task {tid} has undeclared address-space leader {leader}")]
    UnknownVmLeader {
        /// Task in question
        tid: TaskId,
        /// Leader named
        leader: TaskId,
    },
    /// A step names a task the scenario does not declare
    #[error("Step {index} refers to unknown task {tid}")]
    UnknownTask {
        /// Step index
        index: usize,
        /// Task named
        tid: TaskId,
    },
}

/// Run command named in a scenario step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCommand {
    /// Run until the next stop
    Continue,
    /// Execute one instruction
    SingleStep,
    /// Single-step, skipping repeated string instructions
    SingleStepFastForward,
}

/// One simulated tracee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id
    pub tid: TaskId,
    /// Address-space leader; defaults to the task itself
    #[serde(default)]
    pub vm_leader: Option<TaskId>,
    /// Architecture; defaults to the scenario's
    #[serde(default)]
    pub arch: Option<Arch>,
    /// Initial instruction pointer
    #[serde(default)]
    pub ip: u64,
    /// Initial stack pointer
    #[serde(default)]
    pub sp: u64,
    /// Base of the preload globals block, if mapped
    #[serde(default)]
    pub preload_globals: Option<RemotePtr>,
    /// Live kernel results
    #[serde(default)]
    pub kernel: SimKernel,
    /// Stops reached on successive resumes
    #[serde(default)]
    pub stops: Vec<SimStop>,
    /// Random stops appended after `stops`, drawn from the scenario seed
    #[serde(default)]
    pub random_stops: usize,
}

impl TaskSpec {
    /// Task with no stops
    #[must_use]
    pub fn new(tid: TaskId) -> Self {
        Self {
            tid,
            vm_leader: None,
            arch: None,
            ip: 0,
            sp: 0,
            preload_globals: None,
            kernel: SimKernel::new(),
            stops: Vec::new(),
            random_stops: 0,
        }
    }

    /// Set the stops
    #[must_use]
    pub fn with_stops(mut self, stops: Vec<SimStop>) -> Self {
        self.stops = stops;
        self
    }

    /// Set the preload globals block
    #[must_use]
    pub fn with_preload_globals(mut self, base: RemotePtr) -> Self {
        self.preload_globals = Some(base);
        self
    }
}

/// One `diversion_step` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Task to step
    pub tid: TaskId,
    /// Run command
    pub command: StepCommand,
    /// Signal to deliver on resume
    #[serde(default)]
    pub signal: Option<Signal>,
}

/// A complete scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Default architecture for tasks
    pub arch: Arch,
    /// Seed for `random_stops`
    #[serde(default)]
    pub seed: Option<u64>,
    /// Software breakpoint addresses
    #[serde(default)]
    pub breakpoints: Vec<u64>,
    /// Tracees
    pub tasks: Vec<TaskSpec>,
    /// Steps, in order
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Scenario {
    /// Parse a scenario from JSON and check its task references
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the scenario is inconsistent
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check task ids are unique and every leader and step names a declared
    /// task
    ///
    /// # Errors
    ///
    /// Returns error on the first inconsistency found
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut tids = BTreeSet::new();
        for task in &self.tasks {
            if !tids.insert(task.tid) {
                return Err(ScenarioError::DuplicateTask(task.tid));
            }
        }
        for task in &self.tasks {
            if let Some(leader) = task.vm_leader {
                if !tids.contains(&leader) {
                    return Err(ScenarioError::UnknownVmLeader {
                        tid: task.tid,
                        leader,
                    });
                }
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            if !tids.contains(&step.tid) {
                return Err(ScenarioError::UnknownTask {
                    index,
                    tid: step.tid,
                });
            }
        }
        Ok(())
    }

    /// Build the simulated tasks, all appending to `record`
    ///
    /// # Errors
    ///
    /// Returns error if a scripted syscall name does not resolve
    pub fn build_tasks(&self, record: &SharedRecord) -> Result<Vec<SimTask>, ScenarioError> {
        let seed = SimSeed::from_literal(self.seed.unwrap_or(0));
        self.tasks
            .iter()
            .map(|spec| {
                let arch = spec.arch.unwrap_or(self.arch);
                let mut stops = spec.stops.clone();
                if spec.random_stops > 0 {
                    let task_seed = seed.derive(&format!("task-{}", spec.tid));
                    stops.extend(ScriptGenerator::new(arch, &task_seed).script(spec.random_stops));
                }
                // Names are resolved up front so a typo fails the load, not a step
                for stop in &stops {
                    if let SimStop::SyscallEntry { syscall, .. } = stop {
                        syscall.resolve(arch).map_err(|source| ScenarioError::Task {
                            tid: spec.tid,
                            source,
                        })?;
                    }
                }

                let regs = Registers::new(arch).with_ip(spec.ip).with_sp(spec.sp);
                let leader = spec.vm_leader.unwrap_or(spec.tid);
                let mut task = SimTask::new(spec.tid, arch, regs)
                    .with_vm(VmId::new(leader, 0))
                    .with_kernel(spec.kernel.clone())
                    .with_script(stops)
                    .with_record(record.clone());
                if let Some(base) = spec.preload_globals {
                    task = task.with_preload_globals(base);
                }
                Ok(task)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SimRecord;
    use detour_core::Task;

    const KILL_SCENARIO: &str = r#"{
        "name": "kill is suppressed",
        "arch": "x86_64",
        "tasks": [
            {
                "tid": 100,
                "preload_globals": 1879048192,
                "stops": [
                    {"stop": "syscall_entry", "syscall": "kill", "args": [999, 9, 0, 0, 0, 0]},
                    {"stop": "exit"}
                ]
            }
        ],
        "steps": [
            {"tid": 100, "command": "continue"},
            {"tid": 100, "command": "continue"}
        ]
    }"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        assert_eq!(scenario.arch, Arch::X86_64);
        assert_eq!(scenario.tasks.len(), 1);
        assert_eq!(scenario.steps[0].command, StepCommand::Continue);
        assert_eq!(scenario.tasks[0].preload_globals, Some(RemotePtr::new(0x7000_0000)));
    }

    #[test]
    fn test_build_tasks() {
        let scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        let record = SimRecord::shared();
        let tasks = scenario.build_tasks(&record).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].tid(), TaskId::new(100));
        assert_eq!(tasks[0].remaining_stops(), 2);
        assert_eq!(tasks[0].vm(), VmId::new(TaskId::new(100), 0));
    }

    #[test]
    fn test_unknown_step_task() {
        let mut scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        scenario.steps.push(StepSpec {
            tid: TaskId::new(5),
            command: StepCommand::SingleStep,
            signal: None,
        });
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownTask { index: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_task() {
        let mut scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        scenario.tasks.push(TaskSpec::new(TaskId::new(100)));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_undeclared_vm_leader() {
        let mut scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        let mut thread = TaskSpec::new(TaskId::new(101));
        thread.vm_leader = Some(TaskId::new(100));
        scenario.tasks.push(thread);
        assert!(scenario.validate().is_ok());

        scenario.tasks[1].vm_leader = Some(TaskId::new(900));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownVmLeader { .. })
        ));
    }

    #[test]
    fn test_bad_syscall_name_fails_build() {
        let mut scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        scenario.tasks[0].stops.insert(0, SimStop::syscall("not_a_syscall", [0; 6]));
        let err = scenario.build_tasks(&SimRecord::shared()).unwrap_err();
        assert!(matches!(err, ScenarioError::Task { .. }));
    }

    #[test]
    fn test_random_stops_are_appended() {
        let mut scenario = Scenario::from_json(KILL_SCENARIO).unwrap();
        scenario.seed = Some(9);
        scenario.tasks[0].random_stops = 5;
        let tasks = scenario.build_tasks(&SimRecord::shared()).unwrap();
        // two scripted, five random, one trailing exit
        assert_eq!(tasks[0].remaining_stops(), 8);
    }
}
