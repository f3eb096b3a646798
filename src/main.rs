use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ebpr_abm::config::Config;
use ebpr_abm::trajectory;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a configuration and report the schedule and population.
    Check {
        #[arg(long)]
        config: PathBuf,
    },

    /// Run a configuration and write its trajectory.
    Run {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    match args.command {
        Command::Check { config } => check(config)?,
        Command::Run { config, output } => run(config, output)?,
    }

    Ok(())
}

fn check(config: PathBuf) -> Result<()> {
    let cfg = Config::from_file(&config).context("failed to construct cfg")?;
    let engine = cfg.build_engine().context("failed to build engine")?;

    log::info!("total duration: {} days", engine.total_duration());
    if !engine.is_flow_balanced() {
        log::warn!("stages are not flow balanced");
    }
    for (kind, n_agent) in engine.n_agent_by_variant() {
        log::info!("{}: {n_agent} agents", kind.name());
    }
    log::info!("{config:?} is valid");

    Ok(())
}

fn run(config: PathBuf, output: PathBuf) -> Result<()> {
    let cfg = Config::from_file(&config).context("failed to construct cfg")?;
    let mut engine = cfg.build_engine().context("failed to build engine")?;

    let cancel = AtomicBool::new(false);
    trajectory::run_and_record(&mut engine, &output, cfg.output.sample_interval, &cancel)
        .context("failed to run simulation")?;

    for summary in engine.summaries() {
        log::info!(
            "{}: {}/{} active, biomass {}",
            summary.kind.name(),
            summary.n_active,
            summary.n_agent,
            summary.total.biomass
        );
    }

    Ok(())
}
