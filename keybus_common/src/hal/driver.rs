//! Bus driver traits and error types.
//!
//! This module defines:
//! - `PinIo` trait - level and direction access to the bus pins
//! - `BusClock` trait - monotonic time and absolute-deadline sleeps
//! - `HalError` enum - Error types for driver operations

use crate::hal::types::{Deadline, Direction, Level, Pin};
use thiserror::Error;

/// Error types for driver operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// The hardware register block could not be mapped
    #[error("Register mapping failed: {0}")]
    RegisterMap(String),

    /// Clock query failed
    #[error("Clock error: {0}")]
    Clock(String),

    /// Pin number outside the register block
    #[error("Invalid pin {pin}: {reason}")]
    InvalidPin {
        /// Hardware pin number
        pin: u8,
        /// Why it was rejected
        reason: String,
    },
}

/// Level access to the bus pins.
///
/// # Timing Contracts
///
/// | Operation | Max Duration | RT Constraint |
/// |-----------|--------------|---------------|
/// | `configure()` | unbounded | None (pre-RT) |
/// | `read()` | < 1 µs | **HARD** |
/// | `write()` | < 1 µs | **HARD** |
///
/// `read` and `write` are called from the sampler's hot path and must
/// not allocate, block or fail.
pub trait PinIo: Send {
    /// Returns the driver's identifier (e.g., "gpio", "simulation").
    fn name(&self) -> &'static str;

    /// Set a pin's direction. Called once before the sampler starts.
    fn configure(&mut self, pin: Pin, direction: Direction) -> Result<(), HalError>;

    /// Current physical level of a pin.
    fn read(&self, pin: Pin) -> Level;

    /// Drive an output pin.
    fn write(&mut self, pin: Pin, level: Level);
}

/// Monotonic clock with absolute-deadline sleeping.
///
/// Periodic tasks advance a `Deadline` by a fixed step and sleep until it,
/// so scheduling latency never accumulates into drift.
pub trait BusClock: Send {
    /// Current monotonic time.
    fn now(&self) -> Result<Deadline, HalError>;

    /// Sleep until `deadline`. Returns immediately if it already passed.
    fn sleep_until(&mut self, deadline: Deadline);
}
