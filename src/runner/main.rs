mod configs;
mod data_collection;

use chrono::Utc;
use clock_servo::sim::Simulation;
use configs::RunnerConfig;
use data_collection::SampleLog;
use log::*;
use thiserror::Error;

#[derive(Debug, Error)]
enum RunnerError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid config: {0}")]
    Invalid(#[from] clock_servo::ConfigError),
    #[error("failed to save results: {0}")]
    Io(#[from] std::io::Error),
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), RunnerError> {
    let config = RunnerConfig::from_env()?;
    let mut simulation = Simulation::new(&config.simulation)?;
    let mut samples = SampleLog::new();

    let started_at = Utc::now();
    let summary = simulation.run(&mut samples);

    samples.to_csv(&config.output.samples_filepath)?;
    info!(
        "Wrote {} samples to {}",
        samples.len(),
        config.output.samples_filepath
    );
    if let Some(path) = &config.output.summary_filepath {
        samples.save_summary(path, &config, &summary, started_at)?;
        info!("Wrote run summary to {path}");
    }
    Ok(())
}
