use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

use alp_core::AlpError;
use alp_core::app::{LogReport, LoopBuilder, LoopSummary};
use alp_core::config::AlpConfig;
use alp_core::domain::{ErrorSeverity, IterationId, IterationState, IterationStatus};
use alp_core::impls::{FileStateStore, JsonlEventSink};
use alp_core::observability::StatusCounts;
use alp_core::ports::IterationStateStore;

#[derive(Parser, Debug)]
#[command(name = "alp")]
#[command(version)]
#[command(about = "Track, persist and report adaptive learning process iterations")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one JSON record per iteration
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// JSON-lines iteration log
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the built-in simulated learner through the iteration loop
    Run {
        /// Override termination.max_iterations
        #[arg(long)]
        iterations: Option<u32>,

        /// Override termination.performance_threshold
        #[arg(long)]
        target: Option<f64>,
    },

    /// Print one saved iteration record
    Show { id: String },

    /// List saved iterations
    List {
        #[arg(long)]
        status: Option<IterationStatus>,
    },

    /// Count saved iterations per status
    Status,

    /// Print iteration log entries
    Log {
        #[arg(long)]
        status: Option<IterationStatus>,

        #[arg(long)]
        min_iteration: Option<u32>,
    },

    /// Print reported errors from the log
    Errors {
        /// Lowest severity to show (low, medium, high, critical)
        #[arg(long)]
        min_severity: Option<ErrorSeverity>,
    },

    /// Summarize the iteration log
    Report,

    /// Print the effective configuration
    Config,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Alp(#[from] AlpError),

    #[error("iteration {0} not found")]
    NotFound(IterationId),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("iteration loop panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Forward `?` on any core error through `AlpError`.
macro_rules! alp {
    ($e:expr) => {
        $e.map_err(AlpError::from)?
    };
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level);

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AlpConfig, AlpError> {
    let mut config = AlpConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.state_dir {
        config.storage.state_dir = dir.clone();
    }
    if let Some(path) = &cli.log_path {
        config.storage.log_path = path.clone();
    }
    Ok(config)
}

/// Logs go to stderr; stdout carries command output only.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn execute(command: Command, mut config: AlpConfig) -> Result<(), CliError> {
    let store = FileStateStore::new(&config.storage.state_dir);
    let log = JsonlEventSink::new(&config.storage.log_path);

    match command {
        Command::Run { iterations, target } => {
            if let Some(n) = iterations {
                config.termination.max_iterations = n;
            }
            if let Some(t) = target {
                config.termination.performance_threshold = t;
            }
            alp!(config.validate());

            // The loop blocks between retries.
            let summary = tokio::task::spawn_blocking(move || run_simulation(&config, store, log))
                .await??;
            print_json(&summary_json(&summary))?;
        }
        Command::Show { id } => {
            let id = alp!(IterationId::new(id));
            match alp!(store.load(&id)) {
                Some(state) => print_json(&state.to_record())?,
                None => return Err(CliError::NotFound(id)),
            }
        }
        Command::List { status } => {
            let states = match status {
                Some(status) => alp!(store.list_by_status(status)),
                None => alp!(store.list_all()),
            };
            for state in &states {
                println!("{}\t{}", state.id(), state.status());
            }
        }
        Command::Status => {
            let states = alp!(store.list_all());
            print_json(&StatusCounts::from_states(&states))?;
        }
        Command::Log {
            status,
            min_iteration,
        } => {
            for entry in alp!(log.filter_entries(status, min_iteration)) {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Command::Errors { min_severity } => {
            for report in alp!(log.error_reports(min_severity)) {
                println!("{}", serde_json::to_string(&report)?);
            }
        }
        Command::Report => {
            let entries = alp!(log.iteration_entries());
            print_json(&LogReport::from_entries(&entries))?;
        }
        Command::Config => {
            print!("{}", alp!(config.to_toml_string()));
        }
    }
    Ok(())
}

/// Deterministic stand-in learner: performance after `n` iterations is
/// `1 - 0.5^n` (0.5, 0.75, 0.875, ...).
fn simulated_performance(n: u32) -> f64 {
    1.0 - 0.5f64.powi(i32::try_from(n).unwrap_or(i32::MAX))
}

fn run_simulation(
    config: &AlpConfig,
    store: FileStateStore,
    log: JsonlEventSink,
) -> Result<LoopSummary, CliError> {
    let mut iteration_loop = alp!(
        LoopBuilder::new()
            .store(store)
            .sink(log)
            .evaluator(config.termination_evaluator())
            .retry(config.retry_options())
            .parameters(config.parameters.clone())
            .build()
    );

    let mut n = 0;
    let summary = alp!(iteration_loop.run(|state: &mut IterationState| {
        n += 1;
        let performance = simulated_performance(n);
        state.metrics.insert("loss".into(), json!(1.0 - performance));
        Ok::<_, std::io::Error>(performance)
    }));
    Ok(summary)
}

fn summary_json(summary: &LoopSummary) -> serde_json::Value {
    json!({
        "iterations": summary.iterations,
        "best_performance": summary.best_performance,
        "last_performance": summary.last_performance,
        "reason": summary.reason,
        "status": summary.status,
        "event_id": summary.event_id.to_string(),
        "error": summary.error,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulated_learner_improves_monotonically() {
        assert_eq!(simulated_performance(1), 0.5);
        assert_eq!(simulated_performance(2), 0.75);
        assert!(simulated_performance(5) > 0.95);
        assert!(simulated_performance(4) < 0.95);
    }

    #[test]
    fn status_flag_accepts_any_case() {
        let cli = Cli::try_parse_from(["alp", "list", "--status", "completed"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::List {
                status: Some(IterationStatus::Completed)
            }
        ));
    }
}
