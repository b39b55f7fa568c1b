use crate::infra::{build_orchestrator, in_memory_stores};
use crate::server;
use clap::{Args, Parser, Subcommand, ValueEnum};
use screening_pipeline::config::AppConfig;
use screening_pipeline::error::AppError;
use screening_pipeline::integrations::CsvCandidateSource;
use screening_pipeline::telemetry;
use screening_pipeline::workflows::screening::{CandidateSource, TriggerType};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "Screening Pipeline",
    about = "Serve or run the candidate screening call pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run the pipeline once and print the run with its candidate decisions as JSON
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Stop after prepare for review, or place calls too
    #[arg(long, value_enum, default_value_t = RunMode::Prepare)]
    pub(crate) mode: RunMode,
    /// Read candidates from a CSV export instead of the report URL
    #[arg(long)]
    pub(crate) candidates_csv: Option<PathBuf>,
    /// Recorded as the run's trigger actor
    #[arg(long)]
    pub(crate) triggered_by: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    Prepare,
    Full,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Run(args) => run_once(args).await,
    }
}

async fn run_once(args: RunArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let source = args.candidates_csv.map(|path| {
        let source: Arc<dyn CandidateSource> = Arc::new(CsvCandidateSource::new(path));
        source
    });
    let orchestrator = build_orchestrator(&config, in_memory_stores(), source)?;

    let run_id = orchestrator.create_run(TriggerType::Manual, args.triggered_by)?;
    match args.mode {
        RunMode::Prepare => orchestrator.prepare(run_id).await?,
        RunMode::Full => orchestrator.run_full(run_id).await?,
    };

    let run = orchestrator.get_run(run_id)?;
    let candidates = orchestrator.run_decisions(run_id)?;
    println!("{:#}", json!({ "run": run, "candidates": candidates }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_prepare() {
        let cli = Cli::try_parse_from(["screening-pipeline-api", "run"]).unwrap();
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.mode, RunMode::Prepare);
                assert!(args.candidates_csv.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_accepts_csv_and_full_mode() {
        let cli = Cli::try_parse_from([
            "screening-pipeline-api",
            "run",
            "--mode",
            "full",
            "--candidates-csv",
            "leads.csv",
            "--triggered-by",
            "ops",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.mode, RunMode::Full);
                assert_eq!(args.candidates_csv, Some(PathBuf::from("leads.csv")));
                assert_eq!(args.triggered_by.as_deref(), Some("ops"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
