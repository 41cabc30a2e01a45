//! Fixed-width register emulation and Q-format helpers.
//!
//! Every counter in the servo is stored as an `i64`. Intermediate products are
//! formed in `i128` and narrowed back through an [`IntegerWidth`], which either
//! masks to `integer_bits` (emulating a hardware register) or keeps the native
//! 64-bit range when no width is configured.

use crate::error::ConfigError;

/// Width of the registers a process is emulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerWidth {
    /// No emulated register width. Values live in native `i64` registers,
    /// so anything past the `i64` range wraps at 64 bits like the narrower
    /// widths do.
    #[default]
    Unbounded,
    /// Values are reduced modulo `2^bits` after every mutation.
    Bits(u32),
}

impl IntegerWidth {
    pub const MIN_BITS: u32 = 2;
    pub const MAX_BITS: u32 = 63;

    /// Build a width from an optional bit count.
    pub fn from_bits(bits: Option<u32>) -> Result<Self, ConfigError> {
        match bits {
            None => Ok(IntegerWidth::Unbounded),
            Some(bits) if (Self::MIN_BITS..=Self::MAX_BITS).contains(&bits) => {
                Ok(IntegerWidth::Bits(bits))
            }
            Some(bits) => Err(ConfigError::InvalidWidth(bits)),
        }
    }

    /// Number of bits available to a signed value.
    pub fn bits(self) -> u32 {
        match self {
            IntegerWidth::Unbounded => 64,
            IntegerWidth::Bits(bits) => bits,
        }
    }

    /// Largest value representable as a signed register of this width.
    pub fn signed_max(self) -> i64 {
        match self {
            IntegerWidth::Unbounded => i64::MAX,
            IntegerWidth::Bits(bits) => (1i64 << (bits - 1)) - 1,
        }
    }

    /// Reduce modulo `2^bits`, giving the unsigned bit pattern.
    pub fn wrap_unsigned(self, value: i128) -> i64 {
        match self {
            IntegerWidth::Unbounded => value as i64,
            IntegerWidth::Bits(bits) => (value & ((1i128 << bits) - 1)) as i64,
        }
    }

    /// Reduce modulo `2^bits` and sign-extend the top bit (two's complement).
    pub fn wrap_signed(self, value: i128) -> i64 {
        match self {
            IntegerWidth::Unbounded => value as i64,
            IntegerWidth::Bits(bits) => {
                let shift = 128 - bits;
                ((value << shift) >> shift) as i64
            }
        }
    }
}

/// Integer division rounding toward negative infinity.
///
/// `b` must be nonzero.
pub fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Convert a real value to Q format, rounding half to even.
pub fn to_fixed(value: f64, fbits: u32) -> i64 {
    (value * (1u64 << fbits) as f64).round_ties_even() as i64
}

/// Convert a Q-format value back to a real value.
pub fn from_fixed(value: i64, fbits: u32) -> f64 {
    value as f64 / (1u64 << fbits) as f64
}
