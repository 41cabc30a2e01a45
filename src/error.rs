use thiserror::Error;

/// Reasons a simulation configuration is rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be finite and > 0.0, got {value}")]
    NonPositivePeriod { name: &'static str, value: f64 },

    #[error("simulation duration must be finite and > 0.0, got {0}")]
    NonPositiveDuration(f64),

    #[error("integer_bits must be within 2..=63, got {0}")]
    InvalidWidth(u32),

    #[error("{name} = {fbits} does not fit a {integer_bits}-bit signed register")]
    FractionalBitsTooWide {
        name: &'static str,
        fbits: u32,
        integer_bits: u32,
    },

    #[error("{name} must lie in (0, 1), got {value}")]
    GainOutOfRange { name: &'static str, value: f64 },

    #[error("{name} = {value} rounds to zero with {fbits} fractional bits")]
    GainUnderflow {
        name: &'static str,
        value: f64,
        fbits: u32,
    },

    #[error("poll_period must be >= 1 and fit the signed register, got {0}")]
    InvalidPollPeriod(i64),

    #[error("jitter_sd must be finite and >= 0.0, got {0}")]
    NegativeJitter(f64),

    #[error("wander_magnitude {magnitude} must be finite and smaller than the slave clock_period {period}")]
    WanderTooLarge { magnitude: f64, period: f64 },

    #[error("sampling probability must lie in (0, 1], got {0}")]
    InvalidSamplingProbability(f64),
}
