//! `equiv` command-line interface.
//!
//! Exit codes: 0 when every scored pair is equivalent, 1 when the run found
//! mismatches, crashes or timeouts (or was cancelled), 2 on harness errors.

use clap::{Parser, Subcommand};
use equiv_harness::config::{ExecLimits, Granularity, HarnessConfig};
use equiv_harness::corpus::Repository;
use equiv_harness::error::{HarnessError, HarnessResult};
use equiv_harness::harness::{CancelToken, DiffHarness};
use equiv_harness::sandbox::ProcessExecutor;
use equiv_harness::signature::extract;
use equiv_harness::synth::{derive_seeds, PlanBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "equiv")]
#[command(about = "Differential functional-equivalence harness for Python class units", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare candidate implementations against the reference corpus
    Run(RunArgs),

    /// Print the extracted signature of a source file as JSON
    Signature {
        /// Python source file
        file: PathBuf,
    },

    /// Print a synthesized call plan for a source file as JSON
    Plan {
        /// Python source file
        file: PathBuf,
        /// Plan seed (default: first seed derived from the base seed)
        #[arg(long)]
        seed: Option<u64>,
        /// Random calls added after each method is called once
        #[arg(long, default_value_t = 3)]
        calls: usize,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Directory of reference sources (`<unit>.py`)
    #[arg(long)]
    corpus: PathBuf,
    /// Candidate directories, flat or with variant subdirectories
    #[arg(long, num_args = 1.., required = true)]
    candidates: Vec<PathBuf>,
    /// Worker threads
    #[arg(long)]
    workers: Option<usize>,
    /// Wall-clock budget per execution, in seconds
    #[arg(long, default_value_t = 5.0)]
    timeout: f64,
    /// Plans per unit
    #[arg(long, default_value_t = 3)]
    seeds: usize,
    /// Base seed for plan synthesis
    #[arg(long)]
    base_seed: Option<u64>,
    /// Random calls added after each method is called once
    #[arg(long, default_value_t = 3)]
    calls: usize,
    /// Write the JSON report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write a unittest module per pinned plan into this directory
    #[arg(long)]
    emit_tests: Option<PathBuf>,
    /// Write a repro bundle per failing plan into this directory
    #[arg(long)]
    repro_dir: Option<PathBuf>,
    /// How docstring variants are scored
    #[arg(long, value_enum, default_value_t = Granularity::PerVariant)]
    granularity: Granularity,
    /// Python interpreter (default: $EQUIV_PYTHON, then python3)
    #[arg(long)]
    python: Option<PathBuf>,
    /// Captured bytes per output stream
    #[arg(long)]
    output_cap: Option<usize>,
    /// Cancel the run after this many seconds
    #[arg(long)]
    deadline: Option<f64>,
    /// Do not probe the reference for untyped parameters
    #[arg(long)]
    no_probe: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Signature { file }) => signature(&file).map(|()| ExitCode::SUCCESS),
        Some(Commands::Plan { file, seed, calls }) => plan(&file, seed, calls).map(|()| ExitCode::SUCCESS),
        Some(Commands::Version) => {
            println!("equiv v{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("equiv v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            Ok(ExitCode::SUCCESS)
        }
    };
    outcome.unwrap_or_else(|e| {
        error!("{e}");
        ExitCode::from(2)
    })
}

fn run(args: RunArgs) -> HarnessResult<ExitCode> {
    let config = build_config(&args)?;
    config.validate()?;
    let repository = Arc::new(Repository::load(&args.corpus, &args.candidates)?);
    check_interpreter(&config.limits.python)?;

    let cancel = CancelToken::new();
    let finished = CancelToken::new();
    let watchdog = match args.deadline {
        Some(secs) => Some(cancel.cancel_after(seconds("deadline", secs)?, finished.clone())),
        None => None,
    };

    let executor = ProcessExecutor::new(config.limits.clone(), cancel.clone());
    let mut harness = DiffHarness::new(config, repository, executor, cancel)?;
    if let Some(dir) = &args.emit_tests {
        harness = harness.with_emit_tests(dir);
    }
    if let Some(dir) = &args.repro_dir {
        harness = harness.with_repro_dir(dir);
    }
    let result = harness.run();
    finished.cancel();
    if let Some(handle) = watchdog {
        let _ = handle.join();
    }
    let report = result?;

    match &args.report {
        Some(path) => {
            report.save(path)?;
            info!(path = %path.display(), "report written");
            println!("{}", report.summary_line());
        }
        None => println!("{}", report.to_json()?),
    }

    if report.has_failures() || report.cancelled {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn build_config(args: &RunArgs) -> HarnessResult<HarnessConfig> {
    let mut config = HarnessConfig::standard();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.seeds = args.seeds;
    if let Some(base_seed) = args.base_seed {
        config.base_seed = base_seed;
    }
    config.extra_calls = args.calls;
    config.granularity = args.granularity;
    config.probe_untyped = !args.no_probe;

    let mut limits = ExecLimits::standard().with_timeout(seconds("timeout", args.timeout)?);
    if let Some(python) = &args.python {
        limits = limits.with_python(python);
    }
    if let Some(cap) = args.output_cap {
        limits.output_cap = cap;
    }
    config.limits = limits;
    Ok(config)
}

fn seconds(flag: &str, secs: f64) -> HarnessResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| HarnessError::InvalidConfig(format!("--{flag} must be a non-negative number of seconds")))
}

/// Fail fast when the interpreter cannot be started at all.
fn check_interpreter(python: &Path) -> HarnessResult<()> {
    let status = Command::new(python)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(HarnessError::InvalidConfig(format!(
            "python interpreter not usable: {}",
            python.display()
        ))),
    }
}

fn read_source(file: &Path) -> HarnessResult<(String, String)> {
    let source = fs::read_to_string(file).map_err(|e| HarnessError::io(file, e))?;
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((stem, source))
}

fn signature(file: &Path) -> HarnessResult<()> {
    let (stem, source) = read_source(file)?;
    let signature = extract(&source, Some(&stem))?;
    println!("{}", serde_json::to_string_pretty(&signature)?);
    Ok(())
}

fn plan(file: &Path, seed: Option<u64>, calls: usize) -> HarnessResult<()> {
    let (stem, source) = read_source(file)?;
    let signature = extract(&source, Some(&stem))?;
    let seed = match seed {
        Some(seed) => seed,
        None => derive_seeds(HarnessConfig::standard().base_seed, &stem, 1)
            .first()
            .copied()
            .unwrap_or_default(),
    };
    let plan = PlanBuilder::new(&signature)
        .with_extra_calls(calls)
        .build(&stem, seed);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
