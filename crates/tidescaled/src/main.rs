//! tidescaled: the Tidescale driver binary.
//!
//! # Usage
//!
//! ```text
//! tidescaled simulate --scenario web-surge.toml [--config tidescale.toml]
//!                      [--predictor-url http://predictor:8000] [--json]
//! tidescaled check --config tidescale.toml [--scenario web-surge.toml]
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use tidescale_core::EngineConfig;
use tidescaled::{Scenario, SimulationReport, simulate};

#[derive(Parser)]
#[command(name = "tidescaled", about = "Tidescale predictive autoscaler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario through the decision engine.
    Simulate {
        /// Scenario file with targets and per-tick pod usage.
        #[arg(long)]
        scenario: PathBuf,

        /// Engine configuration; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Forecast through this prediction service instead of the
        /// embedded model. Overrides `predictor_url` from the config.
        #[arg(long)]
        predictor_url: Option<String>,

        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Validate an engine configuration and optionally a scenario.
    Check {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        scenario: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tidescale=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Simulate {
            scenario,
            config,
            predictor_url,
            json,
        } => run_simulate(&scenario, config.as_deref(), predictor_url, json).await,
        Command::Check { config, scenario } => run_check(&config, scenario.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::from_file(path)?;
            info!(path = %path.display(), "engine config loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn run_simulate(
    scenario: &Path,
    config: Option<&Path>,
    predictor_url: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config)?;
    if predictor_url.is_some() {
        config.predictor_url = predictor_url;
        config.validate()?;
    }
    info!(
        predictor = config.predictor_url.as_deref().unwrap_or("embedded"),
        "forecast backend"
    );
    let scenario = Scenario::from_file(scenario)?;

    let report = simulate::run(&config, &scenario).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn run_check(config: &Path, scenario: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(Some(config))?;
    info!(
        window_size = config.window_size()?,
        forecast_orders = ?config.forecast,
        "engine config valid"
    );

    if let Some(path) = scenario {
        let scenario = Scenario::from_file(path)?;
        info!(
            targets = scenario.targets.len(),
            ticks = scenario.ticks.len(),
            "scenario valid"
        );
    }

    println!("ok");
    Ok(())
}

fn print_table(report: &SimulationReport) {
    println!(
        "{:>4}  {:>8}  {:<20}  {:<9}  {:>8}  {:>6}  DETAIL",
        "TICK", "TIME", "TARGET", "OUTCOME", "REPLICAS", "LOAD"
    );
    for tick in &report.ticks {
        for d in &tick.decisions {
            println!(
                "{:>4}  {:>7}s  {:<20}  {:<9}  {:>8}  {:>6.2}  {}",
                tick.tick,
                tick.timestamp,
                d.target,
                d.outcome,
                d.replicas,
                d.predicted_load,
                d.detail.as_deref().unwrap_or("")
            );
        }
    }
    println!("{} scale events", report.scale_events());
}
