//! The master reference counter, the disciplined slave and their parameters.

pub mod config;
pub mod fixed;
pub mod jitter;
pub mod master;
pub mod slave;

pub use config::{GainSchedule, MasterConfig, Sampling, SimConfig, SlaveConfig};
pub use fixed::IntegerWidth;
pub use jitter::Jitter;
pub use master::Master;
pub use slave::Slave;
