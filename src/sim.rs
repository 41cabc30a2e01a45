//! Event scheduling and run orchestration.

pub mod run;
pub mod scheduler;

pub use run::{run, Observer, Process, RunSummary, Sample, Simulation};
pub use scheduler::{Dispatch, Scheduler};
