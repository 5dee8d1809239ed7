//! housing-value CLI - run the pipeline stages from the command line

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use housing_value::config::PipelineConfig;
use housing_value::{logging, pipeline};

/// Housing-price batch pipeline
#[derive(Parser, Debug)]
#[command(name = "housing-value", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `housing_value=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Do not log to the console
    #[arg(long, global = true)]
    no_console_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stratify the raw data into train and test splits
    Ingest(PathArgs),
    /// Fit the preparer and search the forest grid on the train split
    Train(PathArgs),
    /// Score the persisted pipeline on the test split
    Score(PathArgs),
    /// Ingest, train and score as one tracked run
    Run(PathArgs),
}

#[derive(Args, Debug, Default)]
struct PathArgs {
    /// Raw housing CSV
    #[arg(long)]
    raw_data: Option<PathBuf>,

    /// Directory for train.csv and test.csv
    #[arg(long)]
    processed_data: Option<PathBuf>,

    /// Directory for the score report (defaults to the processed data directory)
    #[arg(long)]
    output_data: Option<PathBuf>,

    /// Directory for the model artifacts and tracking store
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Fraction of rows held out for testing
    #[arg(long)]
    split_size: Option<f64>,
}

impl Cli {
    fn path_args(&self) -> &PathArgs {
        match &self.command {
            Command::Ingest(args)
            | Command::Train(args)
            | Command::Score(args)
            | Command::Run(args) => args,
        }
    }

    fn resolve_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let paths = self.path_args();
        if let Some(raw) = &paths.raw_data {
            config.paths.raw_data.clone_from(raw);
        }
        if let Some(dir) = &paths.processed_data {
            config.paths.processed_dir.clone_from(dir);
        }
        if let Some(dir) = &paths.output_data {
            config.paths.output_dir = Some(dir.clone());
        }
        if let Some(dir) = &paths.artifacts {
            config.paths.artifacts_dir.clone_from(dir);
        }
        if let Some(size) = paths.split_size {
            config.split.test_size = size;
        }

        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        if self.no_console_log {
            config.logging.console = false;
        }

        config.validate().context("validating configuration")?;
        Ok(config)
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    let _guard = logging::init(&config.logging).context("initializing logging")?;

    match &cli.command {
        Command::Ingest(_) => {
            let summary = pipeline::run_ingest(&config).context("ingest stage failed")?;
            println!(
                "Split {} rows into {} train / {} test",
                summary.raw_rows, summary.train_rows, summary.test_rows
            );
        }
        Command::Train(_) => {
            let summary = pipeline::run_train(&config).context("train stage failed")?;
            println!(
                "Best estimator: {} (cv rmse {:.2}), saved to {}",
                summary.report.pipeline.best_params(),
                summary.report.best_cv_rmse,
                summary.artifact.path.display()
            );
        }
        Command::Score(_) => {
            let summary = pipeline::run_score(&config).context("score stage failed")?;
            println!(
                "RMSE {:.2} over {} rows, report at {}",
                summary.report.rmse(),
                summary.report.actual().len(),
                summary.output_path.display()
            );
        }
        Command::Run(_) => {
            let summary = pipeline::run_all(&config).context("pipeline run failed")?;
            println!(
                "Run {}: best {} / test rmse {:.2}",
                summary.parent_run_id,
                summary.train.report.pipeline.best_params(),
                summary.score.report.rmse()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "housing-value",
            "--no-console-log",
            "run",
            "--processed-data",
            "/tmp/p",
            "--split-size",
            "0.25",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.paths.processed_dir, PathBuf::from("/tmp/p"));
        assert!((config.split.test_size - 0.25).abs() < f64::EPSILON);
        assert!(!config.logging.console);
    }

    #[test]
    fn test_output_data_sets_report_directory() {
        let cli = Cli::parse_from([
            "housing-value",
            "score",
            "--processed-data",
            "/tmp/p",
            "--output-data",
            "/tmp/reports",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(
            config.paths.score_report(),
            PathBuf::from("/tmp/reports/output.csv")
        );
        assert_eq!(config.paths.test_csv(), PathBuf::from("/tmp/p/test.csv"));
    }

    #[test]
    fn test_bad_split_size_rejected() {
        let cli = Cli::parse_from(["housing-value", "ingest", "--split-size", "1.5"]);
        assert!(cli.resolve_config().is_err());
    }
}
