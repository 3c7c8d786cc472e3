//! Pin, level and deadline types shared by every bus driver.
//!
//! ## Electrical Convention
//!
//! The keybus is logically inverted: a physically low line carries a
//! logical one. `Level::to_bit` and `Level::from_bit` are the only
//! places where that inversion happens, and both the read and the write
//! paths go through them.

use crate::consts::NSEC_PER_SEC;
use serde::{Deserialize, Serialize};

/// Logical bus pin.
///
/// The bidirectional data line is wired through two GPIOs: one sampled
/// as input, one driven as output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pin {
    /// Panel clock, input only.
    ClockIn,
    /// Data line as seen by the sampler.
    DataIn,
    /// Data line driver.
    DataOut,
}

/// Physical pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// Line pulled low.
    #[default]
    Low,
    /// Line high.
    High,
}

impl Level {
    /// Decode a physical level into a logical bus bit (low = 1).
    #[inline]
    pub const fn to_bit(self) -> bool {
        matches!(self, Self::Low)
    }

    /// Physical level that transmits the given logical bus bit.
    #[inline]
    pub const fn from_bit(bit: bool) -> Self {
        if bit { Self::Low } else { Self::High }
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// High-impedance input.
    Input,
    /// Push-pull output.
    Output,
}

/// Absolute point on `CLOCK_MONOTONIC`, kept as a normalized
/// (seconds, nanoseconds) pair with `0 <= nanos < 1e9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Deadline {
    secs: i64,
    nanos: i64,
}

impl Deadline {
    /// Build a deadline, normalizing the nanosecond part.
    pub const fn new(secs: i64, nanos: i64) -> Self {
        Self { secs, nanos: 0 }.add_ns(nanos)
    }

    /// Deadline from a raw nanosecond count.
    pub const fn from_nanos(ns: i64) -> Self {
        Self::new(0, ns)
    }

    /// Whole seconds.
    #[inline]
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    /// Sub-second nanoseconds (always `< 1e9`).
    #[inline]
    pub const fn nanos(&self) -> i64 {
        self.nanos
    }

    /// Total nanoseconds.
    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.secs * NSEC_PER_SEC + self.nanos
    }

    /// Advance by `ns` nanoseconds (negative values move backwards).
    #[inline]
    pub const fn add_ns(self, ns: i64) -> Self {
        let mut secs = self.secs + ns / NSEC_PER_SEC;
        let mut nanos = self.nanos + ns % NSEC_PER_SEC;
        while nanos >= NSEC_PER_SEC {
            secs += 1;
            nanos -= NSEC_PER_SEC;
        }
        while nanos < 0 {
            secs -= 1;
            nanos += NSEC_PER_SEC;
        }
        Self { secs, nanos }
    }

    /// Difference `self - earlier` in nanoseconds.
    #[inline]
    pub const fn diff_ns(&self, earlier: &Self) -> i64 {
        (self.secs - earlier.secs) * NSEC_PER_SEC + (self.nanos - earlier.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_inversion_is_symmetric() {
        assert!(Level::Low.to_bit());
        assert!(!Level::High.to_bit());
        assert_eq!(Level::from_bit(true), Level::Low);
        assert_eq!(Level::from_bit(false), Level::High);
        for bit in [false, true] {
            assert_eq!(Level::from_bit(bit).to_bit(), bit);
        }
    }

    #[test]
    fn deadline_normalizes_overflow() {
        let d = Deadline::new(1, 999_995_000).add_ns(10_000);
        assert_eq!(d.secs(), 2);
        assert_eq!(d.nanos(), 5_000);
    }

    #[test]
    fn deadline_normalizes_large_and_negative_steps() {
        let d = Deadline::new(0, 3 * NSEC_PER_SEC + 7);
        assert_eq!((d.secs(), d.nanos()), (3, 7));

        let back = d.add_ns(-8);
        assert_eq!((back.secs(), back.nanos()), (2, NSEC_PER_SEC - 1));
    }

    #[test]
    fn deadline_diff_and_order() {
        let a = Deadline::new(5, 100);
        let b = a.add_ns(2_500_000);
        assert_eq!(b.diff_ns(&a), 2_500_000);
        assert_eq!(a.diff_ns(&b), -2_500_000);
        assert!(b > a);
        assert_eq!(Deadline::from_nanos(b.as_nanos()), b);
    }
}
