//! Demo driver for the simulation engine.
//!
//! Usage: `village-sim [config.json] [years]`. Runs the configured number
//! of years (default 100), printing a yearly digest and a final summary.
//! Exit codes: 0 ok, 1 configuration error, 2 snapshot corruption,
//! 3 fatal simulation error.

use std::process::ExitCode;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use simulation::stats::{age_histogram, life_stage_breakdown};
use simulation::{
    SimulationConfig, SimulationEngine, SimulationError, StatisticsCollector,
};

const EXIT_CONFIG: u8 = 1;
const EXIT_SNAPSHOT: u8 = 2;
const EXIT_FATAL: u8 = 3;

fn exit_code_for(err: &SimulationError) -> u8 {
    match err {
        SimulationError::Config(_) => EXIT_CONFIG,
        SimulationError::Snapshot(_) => EXIT_SNAPSHOT,
        _ => EXIT_FATAL,
    }
}

fn load_config(path: Option<&str>) -> Result<SimulationConfig, SimulationError> {
    match path {
        None => Ok(SimulationConfig::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                SimulationError::Config(simulation::ConfigError::Invalid(format!(
                    "cannot read {path}: {e}"
                )))
            })?;
            Ok(SimulationConfig::from_json_str(&raw)?)
        }
    }
}

fn run() -> Result<(), SimulationError> {
    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1).map(String::as_str))?;
    let years: u32 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);

    let mut engine = SimulationEngine::new(config.clone())?;
    let (stats, observer) = StatisticsCollector::shared();
    engine.subscribe(observer);

    info!(
        population = engine.population().alive_count(),
        years, "starting simulation"
    );

    let autosave = config.auto_save_interval;
    for tick in 1..=years {
        let summary = engine.step_once()?;
        info!(
            date = %summary.date,
            population = summary.population,
            births = summary.births,
            deaths = summary.deaths,
            arrivals = summary.immigrations,
            departures = summary.emigrations,
            "year complete"
        );
        if autosave > 0 && tick % autosave == 0 {
            let bytes = engine.snapshot()?;
            let path = format!("snapshot-{}.bin", summary.date);
            std::fs::write(&path, &bytes).map_err(|e| {
                SimulationError::Snapshot(simulation::SnapshotError::Encode(format!(
                    "cannot write {path}: {e}"
                )))
            })?;
            info!(path = %path, "autosaved snapshot");
        }
    }

    let on = engine.current_date();
    let stats = stats.lock().unwrap();
    println!("=== {} after {} years ===", on, years);
    println!("population:   {}", engine.population().alive_count());
    println!("births:       {}", stats.births);
    println!("deaths:       {}", stats.deaths);
    println!("arrivals:     {}", stats.immigrations);
    println!("departures:   {}", stats.emigrations);
    println!("partnerships: {}", stats.partnerships_formed);
    println!("-- deaths by cause --");
    for (cause, count) in &stats.deaths_by_cause {
        println!("  {cause:?}: {count}");
    }
    println!("-- life stages --");
    for (stage, count) in life_stage_breakdown(engine.population(), on) {
        println!("  {stage:?}: {count}");
    }
    println!("-- age decades --");
    for (decade, count) in age_histogram(engine.population(), on) {
        println!("  {}s: {count}", decade * 10);
    }
    Ok(())
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
    {
        eprintln!("{err:#}");
        return ExitCode::from(EXIT_FATAL);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
