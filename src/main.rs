use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrsim::registry::Registry;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Simulation directory containing `config.toml`.
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every declared scenario end to end.
    Run,

    /// Run a single scenario.
    Scenario {
        #[arg(long)]
        idx: usize,
    },

    /// Remove scenario output directories.
    Clean,
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

    let registry = Registry::new(args.sim_dir).context("failed to construct registry")?;

    match args.command {
        Command::Run => registry.run_all()?,
        Command::Scenario { idx } => registry.run_one(idx)?,
        Command::Clean => registry.clean()?,
    }

    Ok(())
}
