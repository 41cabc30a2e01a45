//! Slave counter disciplined towards the master by a fixed-point servo.
//!
//! Two loops share the master readings taken every `poll_period` raw ticks:
//!
//! - a slow frequency estimator turns the measured error into a cadence of
//!   ±1 nudges applied to `offset` every `correction_period` raw ticks;
//! - a fast phase corrector feeds a fraction of the error into a fixed-point
//!   accumulator and moves `offset` by its whole part straight away.
//!
//! All state lives in registers of the configured [`IntegerWidth`] and is
//! wrapped after every mutation.

use std::f64::consts::PI;

use log::{debug, trace};

use crate::clock::config::SlaveConfig;
use crate::clock::fixed::{floor_div, to_fixed, IntegerWidth};
use crate::clock::jitter::Jitter;
use crate::error::ConfigError;

/// Per-poll decrease of the gains towards their targets.
#[derive(Debug, Clone, Copy)]
struct GainRamp {
    freq_step: i64,
    freq_target: i64,
    phase_step: i64,
    phase_target: i64,
}

#[derive(Debug, Clone)]
pub struct Slave {
    /// Raw local tick count
    raw_time: i64,
    /// Added to `raw_time` to estimate master time
    offset: i64,

    poll_period: i64,
    time_since_last_poll: i64,

    /// Signed Q(`correction_freq_fbits`) rate of ±1 corrections per raw tick
    correction_freq: i64,
    correction_freq_fbits: u32,
    correction_freq_a: i64,

    correction_phase_fbits: u32,
    correction_phase_a: i64,
    fractional_phase_accumulator: i64,

    /// Raw ticks between nudges; 0 until the first nonzero estimate
    correction_period: i64,
    correction: i64,
    time_since_last_correction: i64,

    gain_ramp: Option<GainRamp>,
    phase_step_pending: bool,

    clock_period: f64,
    wander_magnitude: f64,
    wander_period: f64,
    width: IntegerWidth,

    polls: u64,
    nudges: u64,
}

impl Slave {
    pub fn new(config: &SlaveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let width = IntegerWidth::from_bits(config.integer_bits)?;
        let freq_fbits = config.correction_freq_fbits;
        let phase_fbits = config.correction_phase_fbits;

        let freq_target = to_fixed(config.correction_freq_a, freq_fbits);
        let phase_target = to_fixed(config.correction_phase_a, phase_fbits);
        let (correction_freq_a, correction_phase_a, gain_ramp) = match &config.gain_schedule {
            None => (freq_target, phase_target, None),
            Some(schedule) => (
                to_fixed(schedule.freq_start, freq_fbits).max(freq_target),
                to_fixed(schedule.phase_start, phase_fbits).max(phase_target),
                Some(GainRamp {
                    freq_step: to_fixed(schedule.freq_step, freq_fbits),
                    freq_target,
                    phase_step: to_fixed(schedule.phase_step, phase_fbits),
                    phase_target,
                }),
            ),
        };

        Ok(Slave {
            raw_time: width.wrap_unsigned(config.initial_time as i128),
            offset: 0,
            poll_period: config.poll_period,
            time_since_last_poll: 0,
            correction_freq: 0,
            correction_freq_fbits: freq_fbits,
            correction_freq_a,
            correction_phase_fbits: phase_fbits,
            correction_phase_a,
            fractional_phase_accumulator: 0,
            correction_period: 0,
            correction: 0,
            time_since_last_correction: 0,
            gain_ramp,
            phase_step_pending: config.phase_step_on_first_poll,
            clock_period: config.clock_period,
            wander_magnitude: config.wander_magnitude,
            wander_period: config.wander_period,
            width,
            polls: 0,
            nudges: 0,
        })
    }

    /// Current best guess at the master time.
    pub fn time(&self) -> i64 {
        self.width
            .wrap_unsigned(self.raw_time as i128 + self.offset as i128)
    }

    /// Signed difference `master_time - self.time()` in this slave's registers.
    pub fn error_from(&self, master_time: i64) -> i64 {
        self.width
            .wrap_signed(master_time as i128 - self.time() as i128)
    }

    pub fn raw_time(&self) -> i64 {
        self.raw_time
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn correction_freq(&self) -> i64 {
        self.correction_freq
    }

    pub fn correction_freq_fbits(&self) -> u32 {
        self.correction_freq_fbits
    }

    pub fn correction_period(&self) -> i64 {
        self.correction_period
    }

    pub fn correction(&self) -> i64 {
        self.correction
    }

    pub fn fractional_phase_accumulator(&self) -> i64 {
        self.fractional_phase_accumulator
    }

    pub fn correction_phase_fbits(&self) -> u32 {
        self.correction_phase_fbits
    }

    pub fn correction_freq_a(&self) -> i64 {
        self.correction_freq_a
    }

    pub fn correction_phase_a(&self) -> i64 {
        self.correction_phase_a
    }

    pub fn time_since_last_poll(&self) -> i64 {
        self.time_since_last_poll
    }

    pub fn time_since_last_correction(&self) -> i64 {
        self.time_since_last_correction
    }

    pub fn poll_period(&self) -> i64 {
        self.poll_period
    }

    pub fn clock_period(&self) -> f64 {
        self.clock_period
    }

    pub fn width(&self) -> IntegerWidth {
        self.width
    }

    /// Number of polls of the master so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Number of ±1 frequency nudges applied so far.
    pub fn nudges(&self) -> u64 {
        self.nudges
    }

    /// Advance one raw tick at simulated time `now`, running the servo
    /// against `master_time`. Returns the simulated time of the next tick.
    pub fn tick(&mut self, now: f64, master_time: i64, jitter: &mut Jitter) -> f64 {
        self.raw_time = self.width.wrap_unsigned(self.raw_time as i128 + 1);

        self.time_since_last_poll += 1;
        if self.time_since_last_poll >= self.poll_period {
            let noise = jitter.sample();
            let error = self
                .width
                .wrap_signed(self.error_from(master_time) as i128 + noise as i128);
            self.poll(error);
        }

        if self.correction_period != 0 {
            self.time_since_last_correction += 1;
            if self.time_since_last_correction >= self.correction_period {
                self.time_since_last_correction = 0;
                if self.correction != 0 {
                    self.offset = self.wrap(self.offset as i128 + self.correction as i128);
                    self.nudges += 1;
                    trace!("nudge {:+} -> offset {}", self.correction, self.offset);
                }
            }
        }

        self.next_tick(now)
    }

    /// Simulated time of the tick following one at `now`, including wander.
    pub fn next_tick(&self, now: f64) -> f64 {
        let period = self.clock_period
            + ((now / self.wander_period) * 2.0 * PI).sin() * self.wander_magnitude;
        now + period
    }

    /// Feed one (noisy, already wrapped) error measurement into the servo.
    fn poll(&mut self, error: i64) {
        self.polls += 1;

        if self.phase_step_pending {
            self.phase_step_pending = false;
            self.offset = self.wrap(self.offset as i128 + error as i128);
            self.fractional_phase_accumulator = 0;
            self.time_since_last_poll = 0;
            debug!("poll {}: stepped offset by {}", self.polls, error);
            return;
        }

        // The gain is already fixed point, so the product and the quotient by
        // the (integer) elapsed ticks are too.
        let product = self.wrap(error as i128 * self.correction_freq_a as i128);
        let elapsed = self.wrap(self.time_since_last_poll as i128);
        let freq_delta = self.wrap(floor_div(product as i128, elapsed as i128));
        self.correction_freq = self.wrap(self.correction_freq as i128 + freq_delta as i128);
        self.update_correction_period();

        // Only whole ticks reach the offset; the remainder is carried.
        let weighted = self.wrap(error as i128 * self.correction_phase_a as i128);
        let accumulator = self.fractional_phase_accumulator as i128 + weighted as i128;
        let mut whole = accumulator >> self.correction_phase_fbits;
        if accumulator < 0 {
            whole += 1;
        }
        let whole = self.wrap(whole);
        let integral = self.wrap((whole as i128) << self.correction_phase_fbits);
        self.fractional_phase_accumulator = self.wrap(accumulator - integral as i128);
        self.offset = self.wrap(self.offset as i128 + whole as i128);

        self.time_since_last_poll = 0;
        self.ramp_gains();

        debug!(
            "poll {}: error {} freq {} period {} phase_acc {} offset {}",
            self.polls,
            error,
            self.correction_freq,
            self.correction_period,
            self.fractional_phase_accumulator,
            self.offset
        );
    }

    fn update_correction_period(&mut self) {
        // A zero estimate stops the nudges but leaves the period counter
        // cycling, so it picks up mid-period once the estimate returns.
        if self.correction_freq == 0 {
            self.correction = 0;
            return;
        }
        let unit = 1i128 << self.correction_freq_fbits;
        let magnitude = self.wrap((self.correction_freq as i128).abs());
        // A rate of a tick or more per tick nudges on every tick.
        self.correction_period = self.wrap(floor_div(unit, magnitude as i128)).max(1);
        self.correction = self.correction_freq.signum();
    }

    fn ramp_gains(&mut self) {
        if let Some(ramp) = self.gain_ramp {
            self.correction_freq_a = (self.correction_freq_a - ramp.freq_step).max(ramp.freq_target);
            self.correction_phase_a =
                (self.correction_phase_a - ramp.phase_step).max(ramp.phase_target);
        }
    }

    fn wrap(&self, value: i128) -> i64 {
        self.width.wrap_signed(value)
    }
}
