//! Run a project file to its end time and print every stored view as CSV.
//!
//! Usage: `rdevs <project.json> [--separator C] [--max-cascade N] [--external-first]`

use clap::Parser;
use log::{error, info};
use rdevs::core::execution::{ConfluentPolicy, KernelConfig, RootCoordinator};
use rdevs::{DynamicsRegistry, ProjectConfig, SimResult};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "rdevs")]
#[command(about = "Run a DEVS project and print its views as CSV")]
struct Args {
    /// Path to the project file (JSON)
    project: PathBuf,

    /// Column separator of the CSV output
    #[arg(long, default_value_t = ';')]
    separator: char,

    /// Bound on propagation rounds within one instant
    #[arg(long = "max-cascade")]
    max_cascade: Option<usize>,

    /// Apply external transitions before internal ones on confluent events
    #[arg(long = "external-first")]
    external_first: bool,
}

fn run(args: &Args) -> SimResult<()> {
    let project = ProjectConfig::from_path(&args.project)?;

    let mut config = KernelConfig::new();
    if let Some(iterations) = args.max_cascade {
        config = config.with_max_cascade_iterations(iterations);
    }
    if args.external_first {
        config = config.with_confluent_policy(ConfluentPolicy::ExternalFirst);
    }

    let mut root = RootCoordinator::new(config, DynamicsRegistry::with_builtins());
    root.load(&project)?;
    let steps = root.run_all()?;
    root.finish()?;
    info!("{} step(s) executed", steps);

    for (name, matrix) in root.outputs().unwrap_or_default() {
        println!("# view {}", name);
        print!("{}", matrix.to_csv(args.separator));
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}
