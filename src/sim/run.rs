//! A single simulation run: the scheduler, both processes and the sampling of
//! results for an observer.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::clock::config::{SimConfig, Sampling};
use crate::clock::fixed::from_fixed;
use crate::clock::jitter::Jitter;
use crate::clock::master::Master;
use crate::clock::slave::Slave;
use crate::error::ConfigError;
use crate::sim::scheduler::{Dispatch, Scheduler};

/// Handle of the process a scheduled tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Process {
    Master,
    Slave,
}

/// State of both clocks at one dispatched instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Simulated time (s)
    pub time: f64,
    pub master_time: i64,
    pub slave_time: i64,
    /// `master_time - slave_time` in the slave's registers
    pub error: i64,
    /// Correction frequency in nudges per raw tick
    pub correction_freq: f64,
    /// Fractional phase accumulator in ticks
    pub phase_accumulator: f64,
}

/// Receives samples as the run progresses.
pub trait Observer {
    fn observe(&mut self, sample: &Sample);
}

impl<F: FnMut(&Sample)> Observer for F {
    fn observe(&mut self, sample: &Sample) {
        self(sample)
    }
}

/// Counters describing a finished (or paused) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Distinct instants dispatched
    pub dispatches: u64,
    pub master_ticks: u64,
    pub slave_ticks: u64,
    pub polls: u64,
    pub nudges: u64,
    pub samples: u64,
    pub final_time: f64,
    pub final_error: i64,
    /// Largest |error| seen at any dispatched instant
    pub max_abs_error: i64,
}

#[derive(Debug)]
enum Sampler {
    EveryDispatch,
    Interval { interval: f64, next: f64 },
    Probability { probability: f64, rng: StdRng },
}

impl Sampler {
    fn new(sampling: &Sampling, seed: u64) -> Self {
        match *sampling {
            Sampling::EveryDispatch => Sampler::EveryDispatch,
            Sampling::Interval { interval } => Sampler::Interval {
                interval,
                next: 0.0,
            },
            Sampling::Probability { probability } => Sampler::Probability {
                probability,
                rng: StdRng::seed_from_u64(seed),
            },
        }
    }

    fn should_sample(&mut self, now: f64) -> bool {
        match self {
            Sampler::EveryDispatch => true,
            Sampler::Interval { interval, next } => {
                if now < *next {
                    return false;
                }
                *next = ((now / *interval).floor() + 1.0) * *interval;
                true
            }
            Sampler::Probability { probability, rng } => rng.gen_bool(*probability),
        }
    }
}

/// Owns everything a run needs; processes are driven only from here.
#[derive(Debug)]
pub struct Simulation {
    scheduler: Scheduler<Process>,
    clocks: Clocks,
    duration: f64,
}

/// Everything the scheduler's actions touch.
#[derive(Debug)]
struct Clocks {
    master: Master,
    slave: Slave,
    jitter: Jitter,
    sampler: Sampler,
    summary: RunSummary,
}

impl Clocks {
    fn error(&self) -> i64 {
        self.slave.error_from(self.master.time())
    }

    fn sample(&self, now: f64) -> Sample {
        Sample {
            time: now,
            master_time: self.master.time(),
            slave_time: self.slave.time(),
            error: self.error(),
            correction_freq: from_fixed(
                self.slave.correction_freq(),
                self.slave.correction_freq_fbits(),
            ),
            phase_accumulator: from_fixed(
                self.slave.fractional_phase_accumulator(),
                self.slave.correction_phase_fbits(),
            ),
        }
    }
}

/// Ticks processes for the scheduler and samples after each instant.
struct Dispatcher<'a, O> {
    clocks: &'a mut Clocks,
    observer: &'a mut O,
}

impl<O: Observer> Dispatch<Process> for Dispatcher<'_, O> {
    fn dispatch(&mut self, now: f64, process: Process) -> Option<(f64, Process)> {
        let clocks = &mut *self.clocks;
        let next = match process {
            Process::Master => {
                clocks.summary.master_ticks += 1;
                clocks.master.tick(now)
            }
            Process::Slave => {
                clocks.summary.slave_ticks += 1;
                clocks
                    .slave
                    .tick(now, clocks.master.time(), &mut clocks.jitter)
            }
        };
        Some((next, process))
    }

    fn instant_done(&mut self, now: f64) {
        let clocks = &mut *self.clocks;
        clocks.summary.dispatches += 1;
        let error = clocks.error();
        clocks.summary.max_abs_error = clocks.summary.max_abs_error.max(error.abs());

        if clocks.sampler.should_sample(now) {
            self.observer.observe(&clocks.sample(now));
            clocks.summary.samples += 1;
        }
    }
}

impl Simulation {
    /// Build both processes and schedule their first ticks at time 0, master
    /// first.
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            warn!("rejecting simulation config: {err}");
            return Err(err);
        }
        let master = Master::new(&config.master)?;
        let slave = Slave::new(&config.slave)?;

        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.0, Process::Master);
        scheduler.schedule(0.0, Process::Slave);

        Ok(Simulation {
            scheduler,
            clocks: Clocks {
                master,
                slave,
                jitter: Jitter::new(config.slave.jitter_sd, config.seed),
                // separate stream so sampling never perturbs the jitter sequence
                sampler: Sampler::new(&config.sampling, config.seed.wrapping_add(1)),
                summary: RunSummary::default(),
            },
            duration: config.duration,
        })
    }

    pub fn master(&self) -> &Master {
        &self.clocks.master
    }

    pub fn slave(&self) -> &Slave {
        &self.clocks.slave
    }

    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    /// Current `master - slave` error.
    pub fn error(&self) -> i64 {
        self.clocks.error()
    }

    pub fn sample(&self) -> Sample {
        self.clocks.sample(self.now())
    }

    /// Run for the configured duration.
    pub fn run<O: Observer>(&mut self, observer: &mut O) -> RunSummary {
        info!(
            "starting run: duration {}s, master period {}s, slave period {}s, poll period {}",
            self.duration,
            self.clocks.master.clock_period(),
            self.clocks.slave.clock_period(),
            self.clocks.slave.poll_period()
        );
        let summary = self.run_until(self.duration, observer);
        info!(
            "run finished at {}s: {} polls, {} nudges, final error {}, max |error| {}",
            summary.final_time, summary.polls, summary.nudges, summary.final_error, summary.max_abs_error
        );
        summary
    }

    /// Dispatch every instant up to and including `deadline`, offering each
    /// one to the sampler. Can be called repeatedly with later deadlines.
    pub fn run_until<O: Observer>(&mut self, deadline: f64, observer: &mut O) -> RunSummary {
        let mut dispatcher = Dispatcher {
            clocks: &mut self.clocks,
            observer,
        };
        self.scheduler.run_until(deadline, &mut dispatcher);

        let final_time = self.now();
        let final_error = self.error();
        let summary = &mut self.clocks.summary;
        summary.polls = self.clocks.slave.polls();
        summary.nudges = self.clocks.slave.nudges();
        summary.final_time = final_time;
        summary.final_error = final_error;
        summary.clone()
    }
}

/// Build and run a simulation, reporting samples to `observer`.
pub fn run<O: Observer>(config: &SimConfig, observer: &mut O) -> Result<RunSummary, ConfigError> {
    let mut simulation = Simulation::new(config)?;
    Ok(simulation.run(observer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_sampler_takes_first_dispatch_past_each_boundary() {
        let mut sampler = Sampler::new(&Sampling::Interval { interval: 1.0 }, 0);
        let taken: Vec<f64> = [0.0, 0.4, 0.9, 1.1, 1.5, 3.2, 3.9, 4.0]
            .into_iter()
            .filter(|&t| sampler.should_sample(t))
            .collect();
        assert_eq!(taken, vec![0.0, 1.1, 3.2, 4.0]);
    }

    #[test]
    fn probability_sampler_is_seeded() {
        let sampling = Sampling::Probability { probability: 0.25 };
        let mut a = Sampler::new(&sampling, 9);
        let mut b = Sampler::new(&sampling, 9);
        let xs: Vec<bool> = (0..200).map(|i| a.should_sample(i as f64)).collect();
        let ys: Vec<bool> = (0..200).map(|i| b.should_sample(i as f64)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().any(|&x| x) && xs.iter().any(|&x| !x));
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let config = SimConfig {
            duration: -1.0,
            ..SimConfig::default()
        };
        assert_eq!(
            Simulation::new(&config).err(),
            Some(ConfigError::NonPositiveDuration(-1.0))
        );
    }
}
