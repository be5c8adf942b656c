/// Regression harness for remote datacube pipelines: extract band
/// statistics from result datasets, check them against the reference store
/// or record them into it, and drive whole scenarios through the backend.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::{debug, error, info};

use cubecheck_core::{
    CommandExecutor, Dataset, MissingStore, Mode, RegressionSuite, ScenarioCatalog,
    ScenarioOutcome, StatisticsExtractor, SuiteConfig,
};

const DEFAULT_CONFIG: &str = "cubecheck.toml";

#[derive(Parser, Debug)]
#[command(
    name = "cubecheck",
    version,
    about = "Regression checks for remote datacube pipelines"
)]
struct Cli {
    /// Increase verbosity (-v debug, -vv trace). RUST_LOG is honoured.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbosity: u8,

    /// Suite configuration (.toml or .json). Without this flag,
    /// ./cubecheck.toml is used if it exists, otherwise built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the band statistics of a result dataset as JSON.
    Stats {
        #[arg(short, long)]
        dataset: PathBuf,
    },

    /// Compare a result dataset with the stored reference of a scenario.
    Check(DatasetArgs),

    /// Merge the statistics of a result dataset into the reference store.
    Update(DatasetArgs),

    /// Run scenarios on the backend, then check or update them.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct DatasetArgs {
    #[arg(short, long)]
    scenario: String,

    #[arg(short, long)]
    dataset: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Scenario to run; may be repeated.
    #[arg(short, long = "scenario", required_unless_present = "all")]
    scenarios: Vec<String>,

    /// Run every scenario in the catalog.
    #[arg(long, conflicts_with = "scenarios")]
    all: bool,

    #[arg(short, long, value_enum, default_value_t = RunMode::Check)]
    mode: RunMode,

    /// Where result datasets are written, one per scenario.
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Overrides backend.url from the config file.
    #[arg(long, env = "CUBECHECK_BACKEND_URL")]
    backend_url: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RunMode {
    Check,
    Update,
    Execute,
}

impl From<RunMode> for Mode {
    fn from(m: RunMode) -> Self {
        match m {
            RunMode::Check => Mode::Check,
            RunMode::Update => Mode::Update,
            RunMode::Execute => Mode::Execute,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity).context("Failed to initialise logging")?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Stats { dataset } => stats(&config, &dataset),
        Command::Check(args) => check(config, &args),
        Command::Update(args) => update(config, &args),
        Command::Run(args) => run(config, args),
    }
}

// ── Setup ────────────────────────────────────────────────────────────────────

/// 0 → info, 1 → debug, 2+ → trace. Logs go to stdout without targets.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.try_init()
}

fn load_config(path: Option<&Path>) -> Result<SuiteConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).is_file() => PathBuf::from(DEFAULT_CONFIG),
        None => {
            debug!("No {DEFAULT_CONFIG} found; using built-in defaults");
            return Ok(SuiteConfig::default());
        }
    };
    let config = SuiteConfig::load(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    info!("Using config {}", path.display());
    Ok(config)
}

fn open_dataset(path: &Path) -> Result<Dataset> {
    Dataset::open(path).with_context(|| format!("Failed to read dataset {}", path.display()))
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn stats(config: &SuiteConfig, dataset: &Path) -> Result<()> {
    let extractor = StatisticsExtractor::new(config.extract.to_options()?);
    let statistics = extractor
        .compute(&open_dataset(dataset)?)
        .context("Failed to compute statistics")?;
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

fn check(config: SuiteConfig, args: &DatasetArgs) -> Result<()> {
    let suite = RegressionSuite::open(config, MissingStore::Fail)?;
    let dataset = open_dataset(&args.dataset)?;
    let report = suite
        .check(&args.scenario, &dataset)
        .with_context(|| format!("Scenario '{}' failed", args.scenario))?;
    for w in &report.warnings {
        println!("warning: {w}");
    }
    println!(
        "{}: passed, {} statistic(s) checked, {} warning(s)",
        args.scenario,
        report.checked,
        report.warnings.len()
    );
    Ok(())
}

fn update(config: SuiteConfig, args: &DatasetArgs) -> Result<()> {
    let mut suite = RegressionSuite::open(config, MissingStore::StartEmpty)?;
    let dataset = open_dataset(&args.dataset)?;
    let outcome = suite
        .record(&args.scenario, &dataset)
        .with_context(|| format!("Failed to update reference for '{}'", args.scenario))?;
    println!(
        "{}: {:?} into {}",
        args.scenario,
        outcome,
        suite.config().reference.path.display()
    );
    Ok(())
}

fn run(mut config: SuiteConfig, args: RunArgs) -> Result<()> {
    if let Some(url) = args.backend_url {
        config.backend.url = Some(url);
    }
    let mode = Mode::from(args.mode);

    let catalog = ScenarioCatalog::load(&config.scenarios.path).with_context(|| {
        format!("Failed to load scenarios from {}", config.scenarios.path.display())
    })?;
    let names: Vec<String> = if args.all {
        catalog.names().into_iter().map(str::to_string).collect()
    } else {
        args.scenarios
    };

    let executor = CommandExecutor::new(config.backend.clone())?;
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;
    let mut suite = RegressionSuite::for_mode(config, mode)?;

    let mut failed = Vec::new();
    for name in &names {
        let result = catalog
            .lookup(name)
            .map_err(anyhow::Error::from)
            .and_then(|params| {
                suite
                    .run_scenario(params, &executor, &args.output_dir, mode)
                    .map_err(anyhow::Error::from)
            });
        match result {
            Ok(ScenarioOutcome::Passed(report)) => {
                println!("{name}: passed ({} statistic(s) checked)", report.checked)
            }
            Ok(ScenarioOutcome::Recorded(outcome)) => println!("{name}: reference {outcome:?}"),
            Ok(ScenarioOutcome::Executed(path)) => println!("{name}: wrote {}", path.display()),
            Err(e) => {
                error!("{name}: {e:#}");
                failed.push(name.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!(
            "{} of {} scenario(s) failed: {}",
            failed.len(),
            names.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
