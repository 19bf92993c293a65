//! DETOUR CLI
//!
//! Syscall table inspection, policy previews and scenario runs over the
//! simulated tracer.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod inspect;
mod simulate;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use console::style;
use detour_core::Arch;
use detour_policy::Disposition;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "detour")]
#[command(about = "DETOUR - Diversion execution engine for record-and-replay debugging", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up syscalls in an architecture's table
    Syscalls {
        /// Architecture
        #[arg(long)]
        arch: Arch,
        /// Show the syscall with this number
        #[arg(long, conflicts_with = "name")]
        number: Option<i64>,
        /// Show the syscall with this name
        #[arg(long)]
        name: Option<String>,
    },
    /// Show what a diversion does with a syscall
    Classify {
        /// Architecture
        #[arg(long)]
        arch: Arch,
        /// Syscall name or number
        syscall: String,
        /// Treat the call as the preload library's desched ioctl
        #[arg(long)]
        desched: bool,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a scenario file against simulated tracees
    Simulate {
        /// Scenario file
        scenario: PathBuf,
        /// Session config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Run the scenario a second time and require an identical event log
        #[arg(long)]
        repeat: bool,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn disposition_label(disposition: Disposition) -> String {
    let label = disposition.to_string();
    match disposition {
        Disposition::Execute => style(label).green().to_string(),
        Disposition::Suppress => style(label).red().to_string(),
        Disposition::DeschedNoop => style(label).yellow().to_string(),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Syscalls { arch, number, name } => {
            for (number, syscall) in inspect::lookup(arch, number, name.as_deref())? {
                println!("{:>5} {}", number, syscall);
            }
            Ok(())
        }
        Commands::Classify {
            arch,
            syscall,
            desched,
            json,
        } => {
            let classification = inspect::classify(arch, &syscall, desched)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            } else {
                println!(
                    "{} {} ({}): {}",
                    classification.arch,
                    classification.syscall,
                    classification.syscallno,
                    disposition_label(classification.disposition)
                );
            }
            Ok(())
        }
        Commands::Simulate {
            scenario,
            config,
            json,
            repeat,
        } => {
            let config = simulate::load_config(config.as_deref())?;
            let scenario = simulate::load_scenario(&scenario)?;
            let report = if repeat {
                simulate::run_repeated(&scenario, config)?
            } else {
                simulate::run(&scenario, config)?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
            if !report.is_deterministic() {
                Err(color_eyre::eyre::eyre!(
                    "scenario {} is not reproducible",
                    scenario.name
                ))
            } else if report.violations.is_empty() && report.teardown_clean {
                Ok(())
            } else {
                Err(color_eyre::eyre::eyre!(
                    "{} contract violation(s) in scenario {}",
                    report.violations.len(),
                    scenario.name
                ))
            }
        }
    }
}
