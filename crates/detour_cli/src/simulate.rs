//! Scenario harness: drive a diversion session over simulated tracees.

use color_eyre::eyre::{Result, WrapErr};
use console::style;
use detour_core::{syscall_name, Arch, RemotePtr, SyscallId, Task, TaskId};
use detour_session::{
    BreakpointDiagnoser, CapturingDiagnostics, DiversionConfig, DiversionResult, DiversionSession,
    DiversionStatus, RunCommand,
};
use detour_sim::{RunComparison, Scenario, SimRecord, SimTask, StepCommand};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// Load a scenario file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a valid scenario
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read scenario {}", path.display()))?;
    Scenario::from_json(&json).wrap_err_with(|| format!("Failed to load scenario {}", path.display()))
}

/// Load a session config file, or the defaults when no path is given
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config(path: Option<&Path>) -> Result<DiversionConfig> {
    let Some(path) = path else {
        return Ok(DiversionConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
    DiversionConfig::from_json(&json).wrap_err_with(|| format!("Invalid config {}", path.display()))
}

/// Outcome of a single scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step ran
    Completed(DiversionResult),
    /// The step was refused or failed
    Failed(String),
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Position in the scenario
    pub index: usize,
    /// Task stepped
    pub tid: TaskId,
    /// Run command used
    pub command: RunCommand,
    /// What happened
    pub outcome: StepOutcome,
}

/// A syscall that reached the simulated live kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Injection {
    /// Issuing task
    pub tid: TaskId,
    /// Raw number
    pub syscallno: i64,
    /// Symbolic name in the task's architecture
    pub syscall: SyscallId,
}

/// Everything a scenario run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Scenario name
    pub name: String,
    /// Steps in order
    pub steps: Vec<StepReport>,
    /// Syscalls executed for real
    pub injected: Vec<Injection>,
    /// Contract violations reported during the run and at teardown
    pub violations: Vec<String>,
    /// Whether teardown found nothing left behind
    pub teardown_clean: bool,
    /// Full simulation event log
    pub record: SimRecord,
    /// Comparison against a second run, when one was made
    pub determinism: Option<RunComparison>,
}

impl SimulationReport {
    /// Whether a repeat run, if made, produced the same event log
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.determinism.as_ref().is_none_or(|c| c.identical)
    }

    /// Steps that failed
    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .count()
    }

    /// Human-readable summary
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "scenario: {}", style(&self.name).bold());
        for step in &self.steps {
            let line = match &step.outcome {
                StepOutcome::Completed(result) => {
                    let status = match result.status {
                        DiversionStatus::Continuing => style("continuing").green(),
                        DiversionStatus::Exited => style("exited").yellow(),
                    };
                    let mut line = format!("{}", status);
                    let breaks = &result.break_status;
                    if breaks.breakpoint_hit {
                        line.push_str(" breakpoint");
                    }
                    if !breaks.watchpoints_hit.is_empty() {
                        let _ = write!(line, " watchpoints={}", breaks.watchpoints_hit.len());
                    }
                    if breaks.singlestep_complete {
                        line.push_str(" singlestep");
                    }
                    if let Some(signal) = &breaks.signal {
                        let _ = write!(line, " signal={}", signal.signo);
                    }
                    line
                }
                StepOutcome::Failed(err) => format!("{} {}", style("failed").red(), err),
            };
            let _ = writeln!(out, "  [{}] {} {}: {}", step.index, step.tid, step.command, line);
        }
        for injection in &self.injected {
            let _ = writeln!(
                out,
                "  executed {} ({}) for {}",
                injection.syscall, injection.syscallno, injection.tid
            );
        }
        for violation in &self.violations {
            let _ = writeln!(out, "  {} {}", style("violation").red().bold(), violation);
        }
        let teardown = if self.teardown_clean {
            style("clean").green()
        } else {
            style("leaked").red()
        };
        let _ = writeln!(out, "teardown: {}", teardown);
        if let Some(comparison) = &self.determinism {
            let verdict = if comparison.identical {
                style(comparison.report()).green()
            } else {
                style(comparison.report()).red()
            };
            let _ = writeln!(out, "repeat: {}", verdict);
        }
        out
    }
}

fn run_command(command: StepCommand) -> RunCommand {
    match command {
        StepCommand::Continue => RunCommand::Continue,
        StepCommand::SingleStep => RunCommand::SingleStep,
        StepCommand::SingleStepFastForward => RunCommand::SingleStepFastForward,
    }
}

/// Run every step of `scenario` in a fresh session, then tear it down.
///
/// Contract violations are captured into the report rather than aborting,
/// and a failed step does not stop the run.
///
/// # Errors
///
/// Returns error if the scenario's tasks cannot be built or adopted
pub fn run(scenario: &Scenario, config: DiversionConfig) -> Result<SimulationReport> {
    let record = SimRecord::shared();
    let tasks = scenario.build_tasks(&record)?;
    let arches: IndexMap<TaskId, Arch> = tasks.iter().map(|t| (t.tid(), t.arch())).collect();

    let mut diagnoser = BreakpointDiagnoser::new();
    for &addr in &scenario.breakpoints {
        diagnoser.add_breakpoint(RemotePtr::new(addr));
    }
    let diagnostics = CapturingDiagnostics::new();
    let mut session: DiversionSession<SimTask> = DiversionSession::with_diagnoser(config, diagnoser)
        .with_diagnostics(Box::new(diagnostics.clone()));

    for task in tasks {
        session.adopt_task(task)?;
    }
    session.finish_initializing()?;
    info!(
        scenario = %scenario.name,
        tasks = session.task_count(),
        steps = scenario.steps.len(),
        "running scenario"
    );

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let command = run_command(step.command);
        let outcome = match session.diversion_step(step.tid, command, step.signal) {
            Ok(result) => StepOutcome::Completed(result),
            Err(err) => {
                warn!(index, tid = %step.tid, %err, "step failed");
                StepOutcome::Failed(err.to_string())
            }
        };
        steps.push(StepReport {
            index,
            tid: step.tid,
            command,
            outcome,
        });
    }

    let teardown_clean = session.teardown().is_ok();
    let record = record.borrow().clone();
    let injected = record
        .injected_syscalls()
        .into_iter()
        .map(|(tid, syscallno)| Injection {
            tid,
            syscallno,
            syscall: syscall_name(syscallno, arches.get(&tid).copied().unwrap_or(scenario.arch)),
        })
        .collect();

    Ok(SimulationReport {
        name: scenario.name.clone(),
        steps,
        injected,
        violations: diagnostics.violations().iter().map(ToString::to_string).collect(),
        teardown_clean,
        record,
        determinism: None,
    })
}

/// Run `scenario` twice in fresh sessions and compare the two event logs.
///
/// The report is the first run's, with the comparison attached.
///
/// # Errors
///
/// Returns error if either run cannot be set up
pub fn run_repeated(scenario: &Scenario, config: DiversionConfig) -> Result<SimulationReport> {
    let mut first = run(scenario, config.clone())?;
    let second = run(scenario, config)?;
    let comparison = RunComparison::compare(&first.record, &second.record);
    if !comparison.identical {
        warn!(
            scenario = %scenario.name,
            first_divergence = ?comparison.first_divergence,
            "repeat run diverged"
        );
    }
    first.determinism = Some(comparison);
    Ok(first)
}
