/// Print the scenario catalog as a JSON array, one object per scenario, with
/// absent optional fields written as explicit nulls. Meant for job schedulers
/// that fan scenarios out as separate runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cubecheck_core::ScenarioCatalog;

#[derive(Parser, Debug)]
#[command(name = "list_scenarios", about = "Print the scenario catalog as JSON")]
struct Args {
    /// Scenario parameter file.
    #[arg(short, long, default_value = "scenarios_regression_test.json")]
    scenarios: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let catalog = ScenarioCatalog::load(&args.scenarios)
        .with_context(|| format!("Failed to load {}", args.scenarios.display()))?;
    let all: Vec<_> = catalog.iter().collect();
    println!("{}", serde_json::to_string(&all)?);
    Ok(())
}
