//! Discrete-event simulation of a fixed-point clock discipline servo.
//!
//! A free-running master counter is tracked by a slave counter that polls it,
//! estimates its own frequency and phase error and corrects itself using only
//! integer arithmetic on (optionally) fixed-width registers.

pub mod clock;
pub mod error;
pub mod sim;

pub use error::ConfigError;
