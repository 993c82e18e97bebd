//! Repeated-measures survey analysis (rmsa) - command-line entry point
//!
//! **Usage:**
//! ```bash
//! rmsa --input export.json --outdir results/ [--config study.toml] [--seed 7] [--strict]
//! ```
//!
//! Exit codes: 0 on success (warnings included), 1 on fatal input or
//! configuration errors, 2 with `--strict` when any warning was raised.

use anyhow::{Context, Result};
use clap::Parser;
use rmsa_common::config::{load_config, resolve_config_path, resolve_seed, TomlConfig};
use rmsa_engine::report::CliFormatter;
use rmsa_engine::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Command-line arguments for rmsa
#[derive(Parser, Debug)]
#[command(name = "rmsa")]
#[command(about = "Reconcile repeated-measures survey submissions and run non-parametric tests")]
#[command(version)]
struct Args {
    /// Exported submissions (JSON, or CSV when the path ends in .csv)
    #[arg(short, long, env = "RMSA_INPUT")]
    input: PathBuf,

    /// Directory receiving the tables, log.txt and summary.json
    #[arg(short, long, env = "RMSA_OUTDIR")]
    outdir: PathBuf,

    /// TOML config file (overrides RMSA_CONFIG and the per-user config)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Random seed for bootstrap resampling
    #[arg(long)]
    seed: Option<u64>,

    /// Bootstrap resamples per interval
    #[arg(long, value_name = "N")]
    bootstrap: Option<usize>,

    /// Confidence level for bootstrap intervals, in (0, 1)
    #[arg(long, value_name = "LEVEL")]
    confidence: Option<f64>,

    /// Exit with status 2 when any warning was raised
    #[arg(long)]
    strict: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(config_path.as_deref());

    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    if let Some(path) = config_path.as_ref().filter(|p| !p.exists()) {
        warn!(path = %path.display(), "Config file not found; using compiled defaults");
    }

    match config.context("Invalid configuration").and_then(|c| run(&args, c)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: TomlConfig) -> Result<ExitCode> {
    let design = config.study_design().context("Invalid study design")?;

    let mut settings = config.analysis.clone();
    settings.seed = resolve_seed(args.seed, &config);
    if let Some(n) = args.bootstrap {
        settings.bootstrap_resamples = n;
    }
    if let Some(level) = args.confidence {
        settings.confidence_level = level;
    }
    settings.validate().context("Invalid analysis settings")?;

    info!(
        input = %args.input.display(),
        outdir = %args.outdir.display(),
        seed = settings.seed,
        conditions = design.conditions.len(),
        items = design.items.len(),
        "Starting analysis"
    );

    let pipeline = Pipeline::new(design, settings);
    let (output, artifacts) = pipeline
        .run_to_dir(&args.input, &args.outdir)
        .with_context(|| format!("Analysis of {} failed", args.input.display()))?;

    print!("{}", CliFormatter::format_summary(&artifacts.report, &args.outdir));

    if args.strict && !output.diagnostics.is_empty() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
