//! Simulation parameters for the master, the slave servo and the run itself.

use config::{Config, ConfigError as SourceError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::clock::fixed::{to_fixed, IntegerWidth};
use crate::error::ConfigError;

/// Period of a 200 MHz clock divided by 16 (80 ns).
const TICK_PERIOD: f64 = (1.0 / 200_000_000.0) * 16.0;

/// Slave oscillator error in parts per million.
const SLAVE_PPM: f64 = 30.0 / 1_000_000.0;

/// Master counter parameters.
///
/// | Field        | Unit      | Description                              |
/// |--------------|-----------|------------------------------------------|
/// | clock_period | s         | Simulated time between master ticks       |
/// | initial_time | ticks     | Counter value before the first tick       |
/// | integer_bits | bits      | Register width; absent = no wraparound    |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    #[serde(default = "MasterConfig::default_clock_period")]
    pub clock_period: f64,
    #[serde(default)]
    pub initial_time: i64,
    #[serde(default)]
    pub integer_bits: Option<u32>,
}

impl MasterConfig {
    fn default_clock_period() -> f64 {
        TICK_PERIOD
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_period("master.clock_period", self.clock_period)?;
        IntegerWidth::from_bits(self.integer_bits)?;
        Ok(())
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            clock_period: Self::default_clock_period(),
            initial_time: 0,
            integer_bits: None,
        }
    }
}

/// Ramp applied to the servo gains after every poll.
///
/// Gains start at `*_start` and move down by `*_step` per poll without going
/// below the slave's configured `correction_freq_a` / `correction_phase_a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainSchedule {
    pub freq_start: f64,
    pub freq_step: f64,
    pub phase_start: f64,
    pub phase_step: f64,
}

/// Slave oscillator model and servo parameters.
///
/// | Field                  | Unit       | Description                                  |
/// |------------------------|------------|----------------------------------------------|
/// | clock_period           | s          | Nominal time between raw slave ticks         |
/// | wander_magnitude       | s          | Amplitude of the sinusoidal period wander    |
/// | wander_period          | s          | Period of the wander                         |
/// | jitter_sd              | ticks      | Std-dev of noise on each master reading      |
/// | poll_period            | raw ticks  | Ticks between polls of the master            |
/// | correction_freq_a      | 0..1       | Frequency estimator gain                     |
/// | correction_phase_a     | 0..1       | Phase corrector gain                         |
/// | correction_*_fbits     | bits       | Fractional bits of the Q-format state        |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveConfig {
    #[serde(default = "SlaveConfig::default_clock_period")]
    pub clock_period: f64,
    #[serde(default)]
    pub initial_time: i64,
    #[serde(default = "SlaveConfig::default_wander_magnitude")]
    pub wander_magnitude: f64,
    #[serde(default = "SlaveConfig::default_wander_period")]
    pub wander_period: f64,
    #[serde(default = "SlaveConfig::default_jitter_sd")]
    pub jitter_sd: f64,
    #[serde(default)]
    pub integer_bits: Option<u32>,
    #[serde(default = "SlaveConfig::default_fbits")]
    pub correction_freq_fbits: u32,
    #[serde(default = "SlaveConfig::default_fbits")]
    pub correction_phase_fbits: u32,
    #[serde(default = "SlaveConfig::default_poll_period")]
    pub poll_period: i64,
    #[serde(default = "SlaveConfig::default_gain")]
    pub correction_freq_a: f64,
    #[serde(default = "SlaveConfig::default_gain")]
    pub correction_phase_a: f64,
    #[serde(default)]
    pub gain_schedule: Option<GainSchedule>,
    #[serde(default)]
    pub phase_step_on_first_poll: bool,
}

impl SlaveConfig {
    fn default_clock_period() -> f64 {
        TICK_PERIOD * (1.0 - SLAVE_PPM)
    }
    fn default_wander_magnitude() -> f64 {
        TICK_PERIOD * SLAVE_PPM
    }
    fn default_wander_period() -> f64 {
        7.0 * 60.0
    }
    fn default_jitter_sd() -> f64 {
        6.0
    }
    fn default_fbits() -> u32 {
        24
    }
    fn default_poll_period() -> i64 {
        // 48 polls every 5.76 s
        (5.76 / TICK_PERIOD) as i64 / 48
    }
    fn default_gain() -> f64 {
        0.1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_period("slave.clock_period", self.clock_period)?;
        check_period("slave.wander_period", self.wander_period)?;
        if !self.wander_magnitude.is_finite() || self.wander_magnitude.abs() >= self.clock_period {
            return Err(ConfigError::WanderTooLarge {
                magnitude: self.wander_magnitude,
                period: self.clock_period,
            });
        }
        if !(self.jitter_sd >= 0.0 && self.jitter_sd.is_finite()) {
            return Err(ConfigError::NegativeJitter(self.jitter_sd));
        }

        let width = IntegerWidth::from_bits(self.integer_bits)?;
        check_fbits("correction_freq_fbits", self.correction_freq_fbits, width)?;
        check_fbits("correction_phase_fbits", self.correction_phase_fbits, width)?;

        if self.poll_period < 1 || self.poll_period > width.signed_max() {
            return Err(ConfigError::InvalidPollPeriod(self.poll_period));
        }

        check_gain("correction_freq_a", self.correction_freq_a, self.correction_freq_fbits)?;
        check_gain("correction_phase_a", self.correction_phase_a, self.correction_phase_fbits)?;
        if let Some(schedule) = &self.gain_schedule {
            check_gain("gain_schedule.freq_start", schedule.freq_start, self.correction_freq_fbits)?;
            check_gain("gain_schedule.freq_step", schedule.freq_step, self.correction_freq_fbits)?;
            check_gain("gain_schedule.phase_start", schedule.phase_start, self.correction_phase_fbits)?;
            check_gain("gain_schedule.phase_step", schedule.phase_step, self.correction_phase_fbits)?;
        }
        Ok(())
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            clock_period: Self::default_clock_period(),
            initial_time: 0,
            wander_magnitude: Self::default_wander_magnitude(),
            wander_period: Self::default_wander_period(),
            jitter_sd: Self::default_jitter_sd(),
            integer_bits: None,
            correction_freq_fbits: Self::default_fbits(),
            correction_phase_fbits: Self::default_fbits(),
            poll_period: Self::default_poll_period(),
            correction_freq_a: Self::default_gain(),
            correction_phase_a: Self::default_gain(),
            gain_schedule: None,
            phase_step_on_first_poll: false,
        }
    }
}

/// How often the run reports a [`Sample`](crate::sim::Sample) to its observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sampling {
    /// After every dispatched instant.
    EveryDispatch,
    /// At the first dispatch on or after each multiple of `interval` seconds.
    Interval { interval: f64 },
    /// Each dispatch independently with the given probability.
    Probability { probability: f64 },
}

impl Sampling {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Sampling::EveryDispatch => Ok(()),
            Sampling::Interval { interval } => check_period("sampling.interval", interval),
            Sampling::Probability { probability } => {
                if probability > 0.0 && probability <= 1.0 {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidSamplingProbability(probability))
                }
            }
        }
    }
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Interval { interval: 0.01 }
    }
}

/// A complete run: duration, seed and both processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulated seconds to run for
    #[serde(default = "SimConfig::default_duration")]
    pub duration: f64,
    /// Seed for the jitter and sampling generators
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub slave: SlaveConfig,
    #[serde(default)]
    pub sampling: Sampling,
}

impl SimConfig {
    /// Load the config from the file path in the `CONFIG_FILE` env var.
    pub fn from_env() -> Result<Self, SourceError> {
        let path = std::env::var("CONFIG_FILE")
            .map_err(|_| SourceError::Message("CONFIG_FILE environment variable not set".into()))?;
        Self::from_file(&path)
    }

    /// Load the config from a TOML file. Supports:
    /// - Files with a `[simulation]` section (e.g. runner configs)
    /// - Flat files with `duration`, `[master]`, `[slave]` at root
    ///
    /// Environment variables prefixed `CLOCK_SERVO_` override file values,
    /// using `__` between nested keys (`CLOCK_SERVO_SLAVE__POLL_PERIOD=500`).
    pub fn from_file(config_file: &str) -> Result<Self, SourceError> {
        let config = Self::source(config_file)?;
        config
            .get("simulation")
            .or_else(|_| config.try_deserialize())
    }

    /// The layered file + environment source, for callers that read further
    /// sections from the same file.
    pub fn source(config_file: &str) -> Result<Config, SourceError> {
        Config::builder()
            .add_source(File::with_name(config_file))
            .add_source(
                Environment::with_prefix("CLOCK_SERVO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return Err(ConfigError::NonPositiveDuration(self.duration));
        }
        self.master.validate()?;
        self.slave.validate()?;
        self.sampling.validate()
    }

    fn default_duration() -> f64 {
        10.0
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration: Self::default_duration(),
            seed: 0,
            master: MasterConfig::default(),
            slave: SlaveConfig::default(),
            sampling: Sampling::default(),
        }
    }
}

fn check_period(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositivePeriod { name, value })
    }
}

fn check_fbits(name: &'static str, fbits: u32, width: IntegerWidth) -> Result<(), ConfigError> {
    // 1 << fbits must be a positive signed value in the register
    if fbits + 1 < width.bits() {
        Ok(())
    } else {
        Err(ConfigError::FractionalBitsTooWide {
            name,
            fbits,
            integer_bits: width.bits(),
        })
    }
}

fn check_gain(name: &'static str, value: f64, fbits: u32) -> Result<(), ConfigError> {
    if !(value > 0.0 && value < 1.0) {
        return Err(ConfigError::GainOutOfRange { name, value });
    }
    if to_fixed(value, fbits) == 0 {
        return Err(ConfigError::GainUnderflow { name, value, fbits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().expect("default config");
        assert_eq!(SlaveConfig::default().poll_period, 1_500_000);
    }

    #[test]
    fn rejects_non_positive_periods() {
        let mut config = SimConfig::default();
        config.master.clock_period = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositivePeriod {
                name: "master.clock_period",
                value: 0.0
            })
        );
    }

    #[test]
    fn rejects_gain_that_rounds_to_zero() {
        let slave = SlaveConfig {
            correction_freq_fbits: 4,
            correction_freq_a: 0.01,
            ..SlaveConfig::default()
        };
        assert_eq!(
            slave.validate(),
            Err(ConfigError::GainUnderflow {
                name: "correction_freq_a",
                value: 0.01,
                fbits: 4
            })
        );
    }

    #[test]
    fn rejects_non_finite_wander_and_jitter() {
        for magnitude in [f64::NAN, -f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let slave = SlaveConfig {
                wander_magnitude: magnitude,
                ..SlaveConfig::default()
            };
            assert!(
                matches!(slave.validate(), Err(ConfigError::WanderTooLarge { .. })),
                "wander {magnitude} accepted"
            );
        }
        for sd in [f64::NAN, f64::INFINITY] {
            let slave = SlaveConfig {
                jitter_sd: sd,
                ..SlaveConfig::default()
            };
            assert!(matches!(slave.validate(), Err(ConfigError::NegativeJitter(_))));
        }
        let config = SimConfig {
            duration: f64::INFINITY,
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveDuration(f64::INFINITY))
        );
    }

    #[test]
    fn rejects_gain_of_one() {
        let slave = SlaveConfig {
            correction_phase_a: 1.0,
            ..SlaveConfig::default()
        };
        assert!(matches!(
            slave.validate(),
            Err(ConfigError::GainOutOfRange { name: "correction_phase_a", .. })
        ));
    }

    #[test]
    fn rejects_fbits_wider_than_register() {
        let slave = SlaveConfig {
            integer_bits: Some(16),
            correction_freq_fbits: 15,
            correction_phase_fbits: 8,
            poll_period: 100,
            ..SlaveConfig::default()
        };
        assert_eq!(
            slave.validate(),
            Err(ConfigError::FractionalBitsTooWide {
                name: "correction_freq_fbits",
                fbits: 15,
                integer_bits: 16
            })
        );
    }

    #[test]
    fn rejects_poll_period_outside_register() {
        let slave = SlaveConfig {
            integer_bits: Some(8),
            correction_freq_fbits: 4,
            correction_phase_fbits: 4,
            correction_freq_a: 0.5,
            correction_phase_a: 0.5,
            poll_period: 128,
            ..SlaveConfig::default()
        };
        assert_eq!(slave.validate(), Err(ConfigError::InvalidPollPeriod(128)));

        let slave = SlaveConfig {
            poll_period: 0,
            ..SlaveConfig::default()
        };
        assert_eq!(slave.validate(), Err(ConfigError::InvalidPollPeriod(0)));
    }

    #[test]
    fn rejects_bad_sampling() {
        let config = SimConfig {
            sampling: Sampling::Probability { probability: 0.0 },
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSamplingProbability(0.0))
        );
    }
}
