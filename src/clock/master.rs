use crate::clock::config::MasterConfig;
use crate::clock::fixed::IntegerWidth;
use crate::error::ConfigError;

/// Free-running reference counter.
#[derive(Debug, Clone)]
pub struct Master {
    /// Current time (ticks)
    time: i64,
    /// Simulated seconds between ticks
    clock_period: f64,
    width: IntegerWidth,
}

impl Master {
    pub fn new(config: &MasterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let width = IntegerWidth::from_bits(config.integer_bits)?;
        Ok(Self {
            time: width.wrap_unsigned(config.initial_time as i128),
            clock_period: config.clock_period,
            width,
        })
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn clock_period(&self) -> f64 {
        self.clock_period
    }

    /// Advance the counter by one tick and return the time of the next tick.
    pub fn tick(&mut self, now: f64) -> f64 {
        self.time = self.width.wrap_unsigned(self.time as i128 + 1);
        now + self.clock_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counts_and_reschedules() {
        let mut master = Master::new(&MasterConfig {
            clock_period: 1.0,
            initial_time: 0,
            integer_bits: None,
        })
        .unwrap();

        assert_eq!(master.tick(0.0), 1.0);
        assert_eq!(master.tick(1.0), 2.0);
        assert_eq!(master.time(), 2);
    }

    #[test]
    fn tick_wraps_to_zero() {
        let mut master = Master::new(&MasterConfig {
            clock_period: 1.0,
            initial_time: 254,
            integer_bits: Some(8),
        })
        .unwrap();

        master.tick(0.0);
        assert_eq!(master.time(), 255);
        master.tick(1.0);
        assert_eq!(master.time(), 0);
    }

    #[test]
    fn rejects_zero_period() {
        let config = MasterConfig {
            clock_period: 0.0,
            ..MasterConfig::default()
        };
        assert!(Master::new(&config).is_err());
    }
}
