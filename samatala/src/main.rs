//! Samatala - soil leveling run orchestrator
//!
//! Optimizes first-push blade commands, waits for the simulator's point
//! cloud, and optimizes the second push from the resulting terrain.
//!
//! Usage:
//!   samatala [--config samatala.toml] [--pile-height 0.37 ...] [--data-root data] [--simulate]

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;

use samatala::utils::setup_ctrl_c_handler;
use samatala::{PileHeight, PipelineConfig, PipelineDriver, PipelineReport, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: samatala.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pile heights to run; each runs in its own thread
    #[arg(long = "pile-height", alias = "pile_height", num_args = 1.., default_value = "0.37")]
    pile_heights: Vec<PileHeight>,

    /// Override the artifact root directory
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Launch the simulator instead of waiting for an operator to run it
    #[arg(long)]
    simulate: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Configuration comes first so it can set the log level
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("Samatala v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!("  Data root: {}", config.paths.data_root.display());
    log::info!("  Optimizer: {:?}", config.optimizer.backend);
    log::info!(
        "  Simulator: {}",
        if config.simulator.enabled {
            "launched by pipeline"
        } else {
            "external (waiting for artifacts)"
        }
    );

    match run(&config, &args.pile_heights) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_or_default(args.config.as_deref())?;
    if let Some(root) = &args.data_root {
        config.paths.data_root = root.clone();
    }
    if args.simulate {
        config.simulator.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// Run every pile concurrently; the first stage-1 error is returned.
fn run(config: &PipelineConfig, piles: &[PileHeight]) -> Result<()> {
    let running = setup_ctrl_c_handler()?;
    let driver = PipelineDriver::from_config(config, Some(running))?;

    let results: Vec<(PileHeight, Result<PipelineReport>)> = thread::scope(|scope| {
        let handles: Vec<_> = piles
            .iter()
            .map(|&pile| {
                let driver = &driver;
                let handle = thread::Builder::new()
                    .name(format!("pile-{}", pile))
                    .spawn_scoped(scope, move || driver.run(pile));
                (pile, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(pile, handle)| {
                let result = match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload)),
                    Err(e) => Err(e.into()),
                };
                (pile, result)
            })
            .collect()
    });

    let mut first_error = None;
    for (pile, result) in results {
        match result {
            Ok(report) => {
                log::info!(
                    "Pile {}: {} (first push: {})",
                    pile,
                    report.state.name(),
                    report.first_commands.display()
                );
                if let Some(second) = &report.second_commands {
                    log::info!("Pile {}: second push: {}", pile, second.display());
                }
            }
            Err(e) => {
                log::error!("Pile {}: {}", pile, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
