//! Replay stub behavior scenarios from the command line.
//!
//! A scenario configures one stub (returns, throws, callbacks, before-callback
//! hooks) and calls it. `stubctl run` replays it on a virtual clock and prints
//! one JSON line per call outcome and callback invocation.

mod exit_codes;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stub_behavior::io::config::{load_config, render_config, write_config};
use stub_behavior::io::scenario::load_scenario;
use stub_behavior::logging;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "stub-behavior.toml";

#[derive(Parser)]
#[command(
    name = "stubctl",
    version,
    about = "Replay stub behavior scenarios on a virtual clock"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario and print a JSON-lines report.
    Run {
        scenario: PathBuf,
        /// Engine config (TOML). Defaults apply when the file is missing.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Parse a scenario and apply its steps without calling the stub.
    Validate { scenario: PathBuf },
    /// Print the effective engine config as TOML.
    Config {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
        /// Also write the effective config back to `--path`.
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { scenario, config } => cmd_run(&scenario, &config),
        Command::Validate { scenario } => cmd_validate(&scenario),
        Command::Config { path, write } => cmd_config(&path, write),
    }
}

fn cmd_run(scenario_path: &Path, config_path: &Path) -> Result<i32> {
    let config = load_config(config_path).context("load config")?;
    let scenario = load_scenario(scenario_path).context("load scenario")?;
    debug!(scenario = %scenario.name, double = %config.double_name, "replaying");

    let report = scenario.replay(&config).context("replay scenario")?;
    let rendered = report.to_json_lines()?;
    std::io::stdout()
        .lock()
        .write_all(rendered.as_bytes())
        .context("write report")?;

    let unhandled = report.unhandled_count();
    info!(scenario = %scenario.name, unhandled, "replay finished");
    Ok(if unhandled == 0 {
        exit_codes::OK
    } else {
        exit_codes::UNHANDLED
    })
}

fn cmd_validate(scenario_path: &Path) -> Result<i32> {
    let scenario = load_scenario(scenario_path)?;
    println!(
        "valid: scenario={} behaviors={} calls={}",
        scenario.name,
        scenario.behaviors.len(),
        scenario.calls.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_config(path: &Path, write: bool) -> Result<i32> {
    let config = load_config(path)?;
    if write {
        write_config(path, &config)?;
        info!(path = %path.display(), "config written");
    }
    print!("{}", render_config(&config)?);
    Ok(exit_codes::OK)
}
